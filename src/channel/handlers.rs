//! Request handlers of the command channel.

use crate::error::{Error, Result};
use crate::runner::{ActiveConfig, Console};
use actix_web::{HttpRequest, HttpResponse, web};
use std::sync::Arc;

/// Shared state of the channel handlers.
#[derive(Debug, Clone)]
pub struct ChannelState {
    pub config: ActiveConfig,
    pub console: Arc<Console>,
}

impl ChannelState {
    pub fn new(config: ActiveConfig, console: Arc<Console>) -> Self {
        Self { config, console }
    }
}

/// Values of `name` from the form body, falling back to the query string.
///
/// Repeated fields are joined with spaces.
pub fn param(req: &HttpRequest, body: &[u8], name: &str) -> Option<String> {
    let from_body: Vec<String> = url::form_urlencoded::parse(body)
        .filter(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .collect();
    let values = if from_body.is_empty() {
        url::form_urlencoded::parse(req.query_string().as_bytes())
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .collect()
    } else {
        from_body
    };

    let joined = values.join(" ");
    (!joined.trim().is_empty()).then_some(joined)
}

/// Writes the `command` parameter to the console.
pub async fn execute_command(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<ChannelState>,
) -> Result<HttpResponse> {
    let command = param(&req, &body, "command")
        .ok_or_else(|| Error::BadRequest("missing command parameter".to_string()))?;

    tracing::info!(%command, "Executing console command");
    state.console.write_line(&command).await?;
    Ok(HttpResponse::Ok().body("Command executed."))
}

/// Rotates the live RCON password to the `password` parameter.
pub async fn update_password(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<ChannelState>,
) -> Result<HttpResponse> {
    let password = param(&req, &body, "password")
        .ok_or_else(|| Error::BadRequest("missing password parameter".to_string()))?;

    let command = state.config.current().runner.password_command_for(&password);
    state.console.write_line(&command).await?;

    // Only the secret changes; a reload applied during the write stays.
    state
        .config
        .update(|cfg| cfg.server.rcon.password = password);

    tracing::info!("RCON password rotated");
    Ok(HttpResponse::Ok().body("Password updated."))
}

/// Registers the channel routes.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/")
            .route(web::get().to(execute_command))
            .route(web::post().to(execute_command)),
    )
    .service(
        web::resource("/rconPwUpdate")
            .route(web::get().to(update_password))
            .route(web::post().to(update_password)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn body_wins_over_query() {
        let req = TestRequest::with_uri("/?command=from+query").to_http_request();
        assert_eq!(
            param(&req, b"command=from+body", "command").as_deref(),
            Some("from body")
        );
        assert_eq!(param(&req, b"", "command").as_deref(), Some("from query"));
    }

    #[test]
    fn repeated_fields_are_joined() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(
            param(&req, b"command=say&command=hello", "command").as_deref(),
            Some("say hello")
        );
        assert_eq!(param(&req, b"command=", "command"), None);
    }
}
