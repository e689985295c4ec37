//! Basic-auth gate (spec §6/§7: requires TLS, configured as `--basic-auth
//! USER:PASS`). A no-op when no credentials are configured.

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::middleware::Next;
use actix_web::web::Data;
use actix_web::Error;
use base64::Engine;

use qcache_common::error::QError;

use crate::web_error::WebError;

#[derive(Clone)]
pub struct BasicAuthCreds(pub Option<String>);

pub async fn basic_auth(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let creds = req.app_data::<Data<BasicAuthCreds>>().and_then(|c| c.0.clone());
    let Some(expected) = creds else {
        return next.call(req).await;
    };

    let ok = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Basic "))
        .and_then(|b64| base64::engine::general_purpose::STANDARD.decode(b64).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .map(|decoded| decoded == expected)
        .unwrap_or(false);

    if ok {
        next.call(req).await
    } else {
        Err(WebError::from(QError::Unauthorized).into())
    }
}
