use std::io;

use crate::bytes::encrypt_password;
use crate::declar::auth_plugin_names::AuthPlugin;

/// AuthSwitchResponse：按server指定的plugin重新散列password
pub struct AuthPluginSwitchCommand {
    pub password: String,
    pub scramble: String,
    pub auth_plugin: AuthPlugin,
}

impl AuthPluginSwitchCommand {
    pub fn new(password: String, scramble: String, auth_plugin: AuthPlugin) -> Self {
        Self {
            password,
            scramble,
            auth_plugin,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, io::Error> {
        Ok(encrypt_password(
            &self.password,
            &self.scramble,
            &self.auth_plugin,
        ))
    }
}
