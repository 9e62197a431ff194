use common::err::{RpError, RpResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPlugin {
    MySqlNativePassword,
    CachingSha2Password,
}

pub const MY_SQL_NATIVE_PASSWORD: &str = "mysql_native_password";
pub const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";

impl AuthPlugin {
    pub fn from_name(name: &str) -> RpResult<Self> {
        match name {
            MY_SQL_NATIVE_PASSWORD => Ok(AuthPlugin::MySqlNativePassword),
            CACHING_SHA2_PASSWORD => Ok(AuthPlugin::CachingSha2Password),
            other => Err(RpError::ConnectionErr(format!(
                "unsupported auth plugin: {}",
                other
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuthPlugin::MySqlNativePassword => MY_SQL_NATIVE_PASSWORD,
            AuthPlugin::CachingSha2Password => CACHING_SHA2_PASSWORD,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_name() {
        assert_eq!(
            AuthPlugin::from_name("caching_sha2_password").unwrap(),
            AuthPlugin::CachingSha2Password
        );
        assert!(AuthPlugin::from_name("sha256_password").is_err());
    }
}
