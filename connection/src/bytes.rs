use std::io;
use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use common::err::{RpError, RpResult};

use crate::declar::auth_plugin_names::AuthPlugin;
use crate::NULL_TERMINATOR;

pub fn write_null_term_string(cursor: &mut Cursor<&mut Vec<u8>>, str: &str) -> Result<(), io::Error> {
    cursor.write_all(str.as_bytes())?;
    cursor.write_u8(NULL_TERMINATOR)?;
    Ok(())
}

/// length-encoded integer
pub fn read_len_enc_num(cursor: &mut Cursor<&[u8]>) -> RpResult<u64> {
    let first = cursor.read_u8()?;
    let num = match first {
        0xFC => cursor.read_u16::<LittleEndian>()? as u64,
        0xFD => cursor.read_u24::<LittleEndian>()? as u64,
        0xFE => cursor.read_u64::<LittleEndian>()?,
        _ => first as u64,
    };
    Ok(num)
}

/// length-encoded string；0xFB表示SQL NULL
pub fn read_len_enc_str_allow_null(cursor: &mut Cursor<&[u8]>) -> RpResult<Option<String>> {
    let first = cursor.read_u8()?;
    if first == 0xFB {
        return Ok(None);
    }
    let len = match first {
        0xFC => cursor.read_u16::<LittleEndian>()? as u64,
        0xFD => cursor.read_u24::<LittleEndian>()? as u64,
        0xFE => cursor.read_u64::<LittleEndian>()?,
        _ => first as u64,
    };
    let mut buf = vec![0u8; len as usize];
    cursor.read_exact(&mut buf)?;
    Ok(Some(String::from_utf8(buf)?))
}

pub fn read_null_term_string(cursor: &mut Cursor<&[u8]>) -> RpResult<String> {
    let mut buf = vec![];
    loop {
        let b = cursor.read_u8()?;
        if b == NULL_TERMINATOR {
            break;
        }
        buf.push(b);
    }
    Ok(String::from_utf8(buf)?)
}

pub fn read_fixed_string(cursor: &mut Cursor<&[u8]>, len: usize) -> RpResult<String> {
    let mut buf = vec![0u8; len];
    cursor.read_exact(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}

/// 认证响应里的password散列
pub fn encrypt_password(password: &str, scramble: &str, auth_plugin: &AuthPlugin) -> Vec<u8> {
    if password.is_empty() {
        return vec![];
    }
    match auth_plugin {
        AuthPlugin::MySqlNativePassword => {
            let password_hash = sha1(password.as_bytes());
            let concat_hash = [scramble.as_bytes().to_vec(), sha1(&password_hash)].concat();
            xor(&password_hash, &sha1(&concat_hash))
        }
        AuthPlugin::CachingSha2Password => {
            let password_hash = sha256(password.as_bytes());
            let concat_hash = [scramble.as_bytes().to_vec(), sha256(&password_hash)].concat();
            xor(&password_hash, &sha256(&concat_hash))
        }
    }
}

/// caching_sha2全量认证：password+NUL与scramble异或后走RSA
pub fn rsa_encrypt_password(password: &str, scramble: &str, public_key_pem: &[u8]) -> RpResult<Vec<u8>> {
    use openssl::rsa::{Padding, Rsa};

    let mut plain = password.as_bytes().to_vec();
    plain.push(0);
    let xored = xor(&plain, scramble.as_bytes());

    let rsa = Rsa::public_key_from_pem(public_key_pem)
        .map_err(|e| RpError::ConnectionErr(format!("bad rsa public key: {}", e)))?;
    let mut out = vec![0u8; rsa.size() as usize];
    let n = rsa
        .public_encrypt(&xored, &mut out, Padding::PKCS1_OAEP)
        .map_err(|e| RpError::ConnectionErr(format!("rsa encrypt err: {}", e)))?;
    out.truncate(n);
    Ok(out)
}

pub fn xor(slice1: &[u8], slice2: &[u8]) -> Vec<u8> {
    let mut result = vec![0u8; slice1.len()];
    for i in 0..result.len() {
        result[i] = slice1[i] ^ slice2[i % slice2.len()];
    }
    result
}

pub fn sha1(value: &[u8]) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(value);
    hasher.finalize().as_slice().to_vec()
}

pub fn sha256(value: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(value);
    hasher.finalize().as_slice().to_vec()
}
