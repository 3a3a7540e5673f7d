use crate::{
    api,
    cli::actions::Action,
    otp::{InMemoryWindowStore, MockChannel, OtpChannel, OtpService},
    token::TokenSigner,
};
use anyhow::Result;
use std::sync::Arc;
use tracing::warn;
use url::Url;

/// Execute the server action.
///
/// # Errors
///
/// Returns an error if the DSN is malformed or the server fails to start.
pub async fn handle(action: Action) -> Result<()> {
    let Action::Server {
        port,
        dsn,
        otp_mode,
        otp_code,
        token_secret,
        registration_token_ttl,
        session_token_ttl,
    } = action;

    // Catch DSN typos before handing it to the pool.
    let dsn = Url::parse(&dsn)?;

    let channel: Option<Arc<dyn OtpChannel>> = match otp_mode.as_str() {
        "mock" => Some(Arc::new(MockChannel::new(otp_code))),
        _ => {
            warn!("OTP delivery disabled, code requests will fail closed");
            None
        }
    };

    let otp = Arc::new(OtpService::new(
        Arc::new(InMemoryWindowStore::new()),
        channel,
    ));
    let signer = Arc::new(
        TokenSigner::new(&token_secret)
            .with_registration_ttl_seconds(registration_token_ttl)
            .with_session_ttl_seconds(session_token_ttl),
    );

    api::new(port, dsn.to_string(), otp, signer).await
}
