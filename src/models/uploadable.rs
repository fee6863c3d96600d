//! `Uploadable`: the validated, identifier-tagged payload announced by a
//! pre-request (§3, §4.2, §9).
//!
//! Modeled as a tagged variant rather than a deep type hierarchy:
//! [`Identifier`] already carries the measurement/attachment tag, so
//! `Uploadable` is a single struct that matches on `self.identifier`
//! rather than duplicating that tag in a second enum.

use crate::error::{Result, UploadError};
use crate::models::field_source::FieldSource;
use crate::models::identifier::Identifier;
use crate::models::metadata::{ApplicationMeta, AttachmentMeta, DeviceMeta, FormatVersionStatus, MeasurementMeta};
use crate::services::session_store::SessionData;
use crate::services::storage::StorageService;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Uploadable {
    pub identifier: Identifier,
    pub device: DeviceMeta,
    pub application: ApplicationMeta,
    /// Present only when `identifier` is `Identifier::Measurement`.
    pub measurement: Option<MeasurementMeta>,
    /// Always present: `AttachmentMeta::ZERO` for measurements whose
    /// attachment block was absent (see `AttachmentMeta::parse_for_measurement`).
    pub attachment: AttachmentMeta,
}

impl Uploadable {
    /// Parse a measurement announcement from any `FieldSource`.
    pub fn parse_measurement(identifier: Identifier, source: &dyn FieldSource) -> Result<Self> {
        debug_assert!(matches!(identifier, Identifier::Measurement { .. }));
        Ok(Self {
            identifier,
            device: DeviceMeta::parse(source)?,
            application: ApplicationMeta::parse(source)?,
            measurement: Some(MeasurementMeta::parse(source)?),
            attachment: AttachmentMeta::parse_for_measurement(source)?,
        })
    }

    /// Parse an attachment announcement from any `FieldSource`.
    pub fn parse_attachment(identifier: Identifier, source: &dyn FieldSource) -> Result<Self> {
        debug_assert!(matches!(identifier, Identifier::Attachment { .. }));
        Ok(Self {
            identifier,
            device: DeviceMeta::parse(source)?,
            application: ApplicationMeta::parse(source)?,
            measurement: None,
            attachment: AttachmentMeta::parse_for_attachment(source)?,
        })
    }

    /// Cross-field checks that depend on server configuration rather than
    /// the shape of a single field (§4.2 steps 3-4).
    pub fn check_validity(&self, current_format_version: u32) -> Result<()> {
        match self.application.classify(current_format_version) {
            FormatVersionStatus::Deprecated => {
                Err(UploadError::skip_upload("application format version is deprecated"))
            }
            FormatVersionStatus::Unknown => {
                Err(UploadError::invalid_metadata("application format version is not recognized"))
            }
            FormatVersionStatus::Current => {
                if let Some(measurement) = &self.measurement {
                    if measurement.location_count < 2 {
                        return Err(UploadError::skip_upload("fewer than 2 location fixes recorded"));
                    }
                }
                Ok(())
            }
        }
    }

    /// §4.4: a durable object for these identifiers must not already
    /// exist, and an attachment's parent measurement must exist.
    pub async fn check_conflict(&self, storage: &dyn StorageService) -> Result<()> {
        if matches!(self.identifier, Identifier::Attachment { .. }) {
            let parent = self.identifier.measurement_identifier();
            if !storage.has_object(&parent).await? {
                return Err(UploadError::AttachmentWithoutMeasurement);
            }
        }
        if storage.has_object(&self.identifier).await? {
            return Err(UploadError::Conflict);
        }
        Ok(())
    }

    /// Project onto the fields a session binds to (§4.3).
    pub fn bind_to(&self) -> SessionData {
        SessionData::from_identifier(self.identifier)
    }
}
