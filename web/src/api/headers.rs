//! Parses the QCache-specific request headers (spec §6): type hints and
//! stand-in columns, both flat `key=value[,key=value]` lists rather than
//! JSON, so a client can set them without a serializer on hand.

use std::collections::HashMap;

use actix_web::HttpRequest;

use qcache_common::error::{QError, QResult};
use qcache_frame::column::TypeHint;
use qcache_frame::standin::{StandInColumn, StandInSource};
use qcache_frame::Value;

/// `X-QCache-types: col=string|enum,...`
pub fn parse_type_hints(req: &HttpRequest) -> QResult<HashMap<String, TypeHint>> {
    let mut out = HashMap::new();
    let Some(raw) = header_str(req, "X-QCache-types")? else {
        return Ok(out);
    };
    for pair in raw.split(',').filter(|s| !s.is_empty()) {
        let (name, kind) = pair.split_once('=').ok_or_else(|| {
            QError::BadRequest(format!("malformed X-QCache-types entry: '{pair}'"))
        })?;
        let hint = match kind {
            "string" => TypeHint::String,
            "enum" => TypeHint::Enum,
            other => {
                return Err(QError::BadRequest(format!("unknown type hint '{other}' for column '{name}'")))
            }
        };
        out.insert(name.to_string(), hint);
    }
    Ok(out)
}

/// `X-QCache-stand-in-columns: target=source[,target=source]`. A source
/// that parses as a number or `true`/`false` is a constant; anything else is
/// treated as another column's name.
pub fn parse_stand_in_header(req: &HttpRequest) -> QResult<Vec<StandInColumn>> {
    let mut out = Vec::new();
    let Some(raw) = header_str(req, "X-QCache-stand-in-columns")? else {
        return Ok(out);
    };
    for pair in raw.split(',').filter(|s| !s.is_empty()) {
        let (target, source) = pair.split_once('=').ok_or_else(|| {
            QError::BadRequest(format!("malformed X-QCache-stand-in-columns entry: '{pair}'"))
        })?;
        let source = if let Ok(i) = source.parse::<i64>() {
            StandInSource::Const(Value::Int(i))
        } else if let Ok(f) = source.parse::<f64>() {
            StandInSource::Const(Value::Float(f))
        } else if source == "true" || source == "false" {
            StandInSource::Const(Value::Bool(source == "true"))
        } else {
            StandInSource::Column(source.to_string())
        };
        out.push(StandInColumn { target: target.to_string(), source });
    }
    Ok(out)
}

/// Rejects a `Content-Encoding` the core has no codec for. `identity` (or
/// the header's absence) passes through untouched; `gzip`/`lz4` are
/// recognized as valid values for the header but not actually decoded here,
/// since decompression is out of scope — a client sending either gets a 400
/// rather than silently having its compressed body parsed as raw CSV/JSON.
pub fn check_content_encoding(req: &HttpRequest) -> QResult<()> {
    match header_str(req, "Content-Encoding")? {
        None | Some("identity") => Ok(()),
        Some(other) => Err(QError::BadRequest(format!("unsupported content-encoding '{other}'"))),
    }
}

fn header_str<'a>(req: &'a HttpRequest, name: &str) -> QResult<Option<&'a str>> {
    match req.headers().get(name) {
        None => Ok(None),
        Some(v) => v
            .to_str()
            .map(Some)
            .map_err(|_| QError::BadRequest(format!("{name} header is not valid UTF-8"))),
    }
}
