pub mod server;

use secrecy::SecretString;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        otp_mode: String,
        otp_code: String,
        token_secret: SecretString,
        registration_token_ttl: i64,
        session_token_ttl: i64,
    },
}
