//! Builds a validated [`Uploadable`] from either request headers or a JSON
//! pre-request body (§4.2).
//!
//! Both entry points run the same validation order over [`FieldSource`] so
//! a header-carried chunk/status request and a JSON-carried pre-request
//! produce identical `Uploadable` values for the same logical input.

use axum::http::HeaderMap;
use serde_json::Value;

use crate::error::{Result, UploadError};
use crate::models::field_source::FieldSource;
use crate::models::identifier::{AttachmentId, DeviceId, Identifier, MeasurementId};
use crate::models::uploadable::Uploadable;

fn required(source: &dyn FieldSource, name: &str) -> Result<String> {
    source
        .field(name)
        .ok_or_else(|| UploadError::invalid_metadata(format!("missing field {name}")))
}

/// Step 1 of §4.2: parse the identifier triple. `attachmentId` is optional
/// — its presence decides whether this is a measurement or an attachment
/// uploadable. Public so the status handler can resolve identifiers
/// without requiring the full metadata bundle a chunk/pre-request carries.
pub fn parse_identifier(source: &dyn FieldSource) -> Result<Identifier> {
    let device_id = DeviceId::parse(&required(source, "deviceId")?)?;
    let measurement_id = MeasurementId::parse(&required(source, "measurementId")?)?;

    match source.field("attachmentId") {
        Some(raw) => Ok(Identifier::Attachment {
            device_id,
            measurement_id,
            attachment_id: AttachmentId::parse(&raw)?,
        }),
        None => Ok(Identifier::Measurement {
            device_id,
            measurement_id,
        }),
    }
}

/// Build and validate an `Uploadable` from any field source, running the
/// full §4.2 order: identifiers, then device/application/measurement/
/// attachment metadata, then the format-version and location-count
/// cross-checks.
pub fn extract(source: &dyn FieldSource, current_format_version: u32) -> Result<Uploadable> {
    let identifier = parse_identifier(source)?;

    let uploadable = match identifier {
        Identifier::Measurement { .. } => Uploadable::parse_measurement(identifier, source)?,
        Identifier::Attachment { .. } => Uploadable::parse_attachment(identifier, source)?,
    };

    uploadable.check_validity(current_format_version)?;
    Ok(uploadable)
}

/// Header-carried form, used by the chunk and status handlers.
pub fn extract_from_headers(headers: &HeaderMap, current_format_version: u32) -> Result<Uploadable> {
    extract(headers, current_format_version)
}

/// JSON-body form, used by the pre-request handler.
pub fn extract_from_json(body: &Value, current_format_version: u32) -> Result<Uploadable> {
    extract(body, current_format_version)
}
