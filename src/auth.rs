use std::sync::Arc;

use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use tracing::warn;

use crate::accounts::Directory;
use crate::observability::AUTH_FAILURES_TOTAL;

/// Cleartext passwords from the account directory. pgwire compares them.
#[derive(Debug)]
pub struct CoworkAuthSource {
    directory: Arc<Directory>,
}

impl CoworkAuthSource {
    pub fn new(directory: Arc<Directory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl AuthSource for CoworkAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        match login.user().and_then(|user| self.directory.lookup(user)) {
            Some(account) => Ok(Password::new(None, account.password.as_bytes().to_vec())),
            None => {
                metrics::counter!(AUTH_FAILURES_TOTAL).increment(1);
                warn!(user = ?login.user(), "login attempt for unknown user");
                Err(PgWireError::UserError(Box::new(ErrorInfo::new(
                    "FATAL".into(),
                    "28P01".into(),
                    "password authentication failed".into(),
                ))))
            }
        }
    }
}
