/// server响应packet的首字节
pub struct ResponseType;

impl ResponseType {
    pub const OK: u8 = 0x00;
    /// caching_sha2的附加认证数据
    pub const AUTH_MORE_DATA: u8 = 0x01;
    pub const EOF: u8 = 0xFE;
    pub const ERROR: u8 = 0xFF;
}
