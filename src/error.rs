//! Application-wide error types.
//!
//! Centralized error definitions for handling various failure conditions
//! such as UEFI errors, file system errors, and invalid configurations.

#[derive(Debug, thiserror_no_std::Error)]
/// The primary error type for the application.
pub enum AppError {
    #[error(transparent)]
    Uefi(#[from] uefi::Error),
    #[error(transparent)]
    UefiFs(#[from] uefi::fs::Error),
    #[error(transparent)]
    FromStrError(#[from] uefi::data_types::FromStrError),
    #[error(transparent)]
    Builder(#[from] uefi::proto::device_path::build::BuildError),
    #[error(transparent)]
    Path(#[from] uefi::proto::device_path::DevicePathUtilitiesError),
    /// The raw bytes read from a block device did not look like a GPT disk.
    #[error("not a GPT disk: {0}")]
    NotGpt(&'static str),
    /// A device path did not contain the node the caller was looking for.
    #[error("device path is missing a required node")]
    MissingDevicePathNode,
    #[error("Error: {0}")]
    Generic(&'static str),
    #[error("NotImplemented: {0}")]
    NotImplemented(&'static str),
}

impl From<uefi::Status> for AppError {
    fn from(status: uefi::Status) -> Self {
        AppError::Uefi(uefi::Error::new(status, ()))
    }
}
