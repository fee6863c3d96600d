//! Protocol identifiers: `deviceId`, `measurementId`, `attachmentId`.
//!
//! Every uploadable is named globally by `(deviceId, measurementId[,
//! attachmentId])`. `deviceId` is a UUID; `measurementId` and
//! `attachmentId` are positive integers rendered as decimal strings (max
//! 20 characters).

use uuid::Uuid;

use crate::error::UploadError;

/// A mobile device, identified by a UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct DeviceId(pub Uuid);

impl DeviceId {
    pub fn parse(raw: &str) -> Result<Self, UploadError> {
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|_| UploadError::invalid_metadata("deviceId must be a canonical UUID"))
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A measurement (a track of geolocations plus sensor streams).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MeasurementId(pub u64);

impl MeasurementId {
    pub fn parse(raw: &str) -> Result<Self, UploadError> {
        parse_positive_decimal(raw).map(Self)
    }
}

impl std::fmt::Display for MeasurementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An attachment (log, image, or video) belonging to a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct AttachmentId(pub u64);

impl AttachmentId {
    pub fn parse(raw: &str) -> Result<Self, UploadError> {
        parse_positive_decimal(raw).map(Self)
    }
}

impl std::fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn parse_positive_decimal(raw: &str) -> Result<u64, UploadError> {
    if raw.is_empty() || raw.len() > 20 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(UploadError::invalid_metadata(
            "expected a positive decimal integer of at most 20 digits",
        ));
    }
    let value: u64 = raw
        .parse()
        .map_err(|_| UploadError::invalid_metadata("integer identifier out of range"))?;
    if value == 0 {
        return Err(UploadError::invalid_metadata(
            "integer identifiers must be positive",
        ));
    }
    Ok(value)
}

/// The identity of an uploadable: either a measurement or one of its
/// attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identifier {
    Measurement {
        device_id: DeviceId,
        measurement_id: MeasurementId,
    },
    Attachment {
        device_id: DeviceId,
        measurement_id: MeasurementId,
        attachment_id: AttachmentId,
    },
}

impl Identifier {
    pub fn device_id(&self) -> DeviceId {
        match self {
            Self::Measurement { device_id, .. } => *device_id,
            Self::Attachment { device_id, .. } => *device_id,
        }
    }

    pub fn measurement_id(&self) -> MeasurementId {
        match self {
            Self::Measurement { measurement_id, .. } => *measurement_id,
            Self::Attachment { measurement_id, .. } => *measurement_id,
        }
    }

    pub fn attachment_id(&self) -> Option<AttachmentId> {
        match self {
            Self::Measurement { .. } => None,
            Self::Attachment { attachment_id, .. } => Some(*attachment_id),
        }
    }

    /// Parent measurement identity, for attachments.
    pub fn measurement_identifier(&self) -> Identifier {
        Identifier::Measurement {
            device_id: self.device_id(),
            measurement_id: self.measurement_id(),
        }
    }

    /// Stable key used by the durable-object index for deduplication.
    pub fn storage_key(&self) -> String {
        match self {
            Self::Measurement {
                device_id,
                measurement_id,
            } => format!("m:{device_id}:{measurement_id}"),
            Self::Attachment {
                device_id,
                measurement_id,
                attachment_id,
            } => format!("a:{device_id}:{measurement_id}:{attachment_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measurement_id_rejects_zero_and_non_digits() {
        assert!(MeasurementId::parse("0").is_err());
        assert!(MeasurementId::parse("-1").is_err());
        assert!(MeasurementId::parse("12a").is_err());
        assert!(MeasurementId::parse("").is_err());
        assert_eq!(MeasurementId::parse("42").unwrap(), MeasurementId(42));
    }

    #[test]
    fn measurement_id_rejects_overlong_strings() {
        let too_long = "1".repeat(21);
        assert!(MeasurementId::parse(&too_long).is_err());
    }

    #[test]
    fn device_id_requires_canonical_uuid() {
        assert!(DeviceId::parse("not-a-uuid").is_err());
        assert!(DeviceId::parse("d290f1ee-6c54-4b01-90e6-d701748f0851").is_ok());
    }

    #[test]
    fn storage_key_distinguishes_measurement_and_attachment() {
        let device_id = DeviceId::parse("d290f1ee-6c54-4b01-90e6-d701748f0851").unwrap();
        let measurement_id = MeasurementId(1);
        let measurement = Identifier::Measurement {
            device_id,
            measurement_id,
        };
        let attachment = Identifier::Attachment {
            device_id,
            measurement_id,
            attachment_id: AttachmentId(1),
        };
        assert_ne!(measurement.storage_key(), attachment.storage_key());
        assert_eq!(attachment.measurement_identifier(), measurement);
    }
}
