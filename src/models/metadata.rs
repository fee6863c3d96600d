//! Metadata sub-records carried by an `Uploadable` (§3).

use crate::error::UploadError;
use crate::models::field_source::FieldSource;

fn require_len(name: &str, value: &str, min: usize, max: usize) -> Result<(), UploadError> {
    if value.chars().count() < min || value.chars().count() > max {
        return Err(UploadError::invalid_metadata(format!(
            "{name} must be {min}..{max} characters, got {}",
            value.chars().count()
        )));
    }
    Ok(())
}

fn required_field(source: &dyn FieldSource, name: &str) -> Result<String, UploadError> {
    source
        .field(name)
        .ok_or_else(|| UploadError::invalid_metadata(format!("missing field {name}")))
}

fn parse_u32(name: &str, raw: &str) -> Result<u32, UploadError> {
    raw.parse()
        .map_err(|_| UploadError::invalid_metadata(format!("{name} must be a non-negative integer")))
}

fn parse_u64(name: &str, raw: &str) -> Result<u64, UploadError> {
    raw.parse()
        .map_err(|_| UploadError::invalid_metadata(format!("{name} must be a non-negative integer")))
}

fn parse_f64(name: &str, raw: &str) -> Result<f64, UploadError> {
    raw.parse()
        .map_err(|_| UploadError::invalid_metadata(format!("{name} must be a number")))
}

/// `DeviceMeta{osVersion, deviceType}`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DeviceMeta {
    pub os_version: String,
    pub device_type: String,
}

impl DeviceMeta {
    pub fn parse(source: &dyn FieldSource) -> Result<Self, UploadError> {
        let os_version = required_field(source, "osVersion")?;
        let device_type = required_field(source, "deviceType")?;
        require_len("osVersion", &os_version, 1, 30)?;
        require_len("deviceType", &device_type, 1, 30)?;
        Ok(Self {
            os_version,
            device_type,
        })
    }
}

/// Result of classifying `ApplicationMeta::format_version` against the
/// currently supported version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersionStatus {
    Current,
    /// Lower than current: the server deliberately skips the upload.
    Deprecated,
    /// Anything else: a semantically invalid request.
    Unknown,
}

/// `ApplicationMeta{appVersion, formatVersion}`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ApplicationMeta {
    pub app_version: String,
    pub format_version: u32,
}

impl ApplicationMeta {
    pub fn parse(source: &dyn FieldSource) -> Result<Self, UploadError> {
        let app_version = required_field(source, "appVersion")?;
        require_len("appVersion", &app_version, 1, 30)?;
        let format_version = parse_u32("formatVersion", &required_field(source, "formatVersion")?)?;
        Ok(Self {
            app_version,
            format_version,
        })
    }

    pub fn classify(&self, current_format_version: u32) -> FormatVersionStatus {
        if self.format_version < current_format_version {
            FormatVersionStatus::Deprecated
        } else if self.format_version != current_format_version {
            FormatVersionStatus::Unknown
        } else {
            FormatVersionStatus::Current
        }
    }
}

/// `GeoLocation{timestamp_ms, lat, lon}`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct GeoLocation {
    pub timestamp_ms: i64,
    pub lat: f64,
    pub lon: f64,
}

impl GeoLocation {
    fn parse(source: &dyn FieldSource, lat_field: &str, lon_field: &str, ts_field: &str) -> Result<Self, UploadError> {
        let lat = parse_f64(lat_field, &required_field(source, lat_field)?)?;
        let lon = parse_f64(lon_field, &required_field(source, lon_field)?)?;
        let timestamp_ms: i64 = required_field(source, ts_field)?
            .parse()
            .map_err(|_| UploadError::invalid_metadata(format!("{ts_field} must be an integer")))?;
        if !(-90.0..=90.0).contains(&lat) {
            return Err(UploadError::invalid_metadata(format!("{lat_field} out of range")));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(UploadError::invalid_metadata(format!("{lon_field} out of range")));
        }
        Ok(Self {
            timestamp_ms,
            lat,
            lon,
        })
    }
}

/// `MeasurementMeta{length, locationCount, startLocation, endLocation, modality}`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MeasurementMeta {
    pub length: f64,
    pub location_count: u32,
    pub start_location: Option<GeoLocation>,
    pub end_location: Option<GeoLocation>,
    pub modality: String,
}

impl MeasurementMeta {
    /// Parses the full record. Returns `Ok(None)` when `locationCount < 2`
    /// (§4.2 step 3: "too few locations" maps to `SkipUpload` one level up,
    /// in `MetaDataExtractor`, not here — this just reports the count so
    /// the caller can classify it).
    pub fn parse(source: &dyn FieldSource) -> Result<Self, UploadError> {
        let length = parse_f64("length", &required_field(source, "length")?)?;
        if length < 0.0 {
            return Err(UploadError::invalid_metadata("length must be >= 0"));
        }
        let location_count = parse_u32("locationCount", &required_field(source, "locationCount")?)?;
        let modality = required_field(source, "modality")?;
        require_len("modality", &modality, 1, 30)?;

        let (start_location, end_location) = if location_count > 0 {
            (
                Some(GeoLocation::parse(source, "startLocLat", "startLocLon", "startLocTS")?),
                Some(GeoLocation::parse(source, "endLocLat", "endLocLon", "endLocTS")?),
            )
        } else {
            (None, None)
        };

        Ok(Self {
            length,
            location_count,
            start_location,
            end_location,
            modality,
        })
    }
}

/// `AttachmentMeta{logCount, imageCount, videoCount, filesSize}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct AttachmentMeta {
    pub log_count: u32,
    pub image_count: u32,
    pub video_count: u32,
    pub files_size: u64,
}

impl AttachmentMeta {
    pub const ZERO: Self = Self {
        log_count: 0,
        image_count: 0,
        video_count: 0,
        files_size: 0,
    };

    fn parse_fields(source: &dyn FieldSource) -> Result<Self, UploadError> {
        Ok(Self {
            log_count: parse_u32("logCount", &required_field(source, "logCount")?)?,
            image_count: parse_u32("imageCount", &required_field(source, "imageCount")?)?,
            video_count: parse_u32("videoCount", &required_field(source, "videoCount")?)?,
            files_size: parse_u64("filesSize", &required_field(source, "filesSize")?)?,
        })
    }

    fn is_present(source: &dyn FieldSource) -> bool {
        ["logCount", "imageCount", "videoCount", "filesSize"]
            .iter()
            .any(|name| source.field(name).is_some())
    }

    fn is_complete(source: &dyn FieldSource) -> bool {
        ["logCount", "imageCount", "videoCount", "filesSize"]
            .iter()
            .all(|name| source.field(name).is_some())
    }

    /// Measurement uploads: a fully-absent block is legal (all zeros, for
    /// backward compatibility); a partially-present block is invalid.
    pub fn parse_for_measurement(source: &dyn FieldSource) -> Result<Self, UploadError> {
        if !Self::is_present(source) {
            return Ok(Self::ZERO);
        }
        if !Self::is_complete(source) {
            return Err(UploadError::invalid_metadata(
                "attachment metadata block is partially present",
            ));
        }
        Self::parse_fields(source)
    }

    /// Attachment uploads: all four fields are required, non-negative,
    /// with at least one positive count and `filesSize > 0`.
    pub fn parse_for_attachment(source: &dyn FieldSource) -> Result<Self, UploadError> {
        let meta = Self::parse_fields(source)?;
        if meta.files_size == 0 {
            return Err(UploadError::invalid_metadata("filesSize must be > 0 for attachments"));
        }
        if meta.log_count == 0 && meta.image_count == 0 && meta.video_count == 0 {
            return Err(UploadError::invalid_metadata(
                "at least one of logCount/imageCount/videoCount must be positive for attachments",
            ));
        }
        Ok(meta)
    }
}
