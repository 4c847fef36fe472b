//! Loads and starts a chosen UEFI image.
//!
//! Synthesizes a device path to the target file, `load_image`s it, opens
//! `LoadedImage` exclusively to set load options, then `start_image`s it.
//! The driver pre-loading pass reuses the same sequence and tolerates a
//! `Status::ABORTED` return per image, continuing to the next one.

use uefi::boot::LoadImageSource;
use uefi::proto::device_path::DevicePath;
use uefi::proto::loaded_image::LoadedImage;
use uefi::{CString16, Status};

use crate::devpath;
use crate::error::AppError;
use crate::registry::{DiskInfo, Loader};

/// Load and start `loader`, chained off `disk.device_path`.
///
/// On `Status::ABORTED` this returns `Ok(())`: UEFI drivers commonly abort
/// right after registering themselves, which is a benign completion rather
/// than a failure.
pub fn boot_loader(loader: &Loader, disk: &DiskInfo) -> Result<(), AppError> {
    let file_name = CString16::try_from(loader.file_name.as_str())
        .map_err(|_| AppError::Generic("loader file name is not valid UTF-16"))?;
    let img_path = devpath::synthesize_file_path(&disk.device_path, &file_name)?;

    start_image_at(&img_path, loader.args.as_deref())
}

/// Chain-load every `.efi` file directly inside `dir_name` on `device_path`,
/// tolerating `Aborted` per image and continuing to the next one.
///
/// Used before interactive discovery to pre-load drivers from
/// `EFI\zbl\drivers`.
pub fn preload_drivers(device_path: &DevicePath, file_names: &[uefi::CString16]) {
    for file_name in file_names {
        let Ok(img_path) = devpath::synthesize_file_path(device_path, file_name) else {
            log::warn!("failed to synthesize driver path for {file_name}");
            continue;
        };
        if let Err(e) = start_image_at(&img_path, None) {
            log::warn!("driver {file_name} failed to start: {e}");
        }
    }
}

fn start_image_at(img_path: &DevicePath, args: Option<&str>) -> Result<(), AppError> {
    let src = LoadImageSource::FromDevicePath {
        device_path: img_path,
        boot_policy: Default::default(),
    };
    let image_handle = uefi::boot::load_image(uefi::boot::image_handle(), src)?;
    let mut loaded_image = uefi::boot::open_protocol_exclusive::<LoadedImage>(image_handle)?;

    // `options_storage` must outlive `start_image`: `set_load_options` only
    // stores the raw pointer, and the firmware reads it when the image runs.
    let options_storage = args
        .map(CString16::try_from)
        .transpose()
        .map_err(|_| AppError::Generic("load options are not valid UTF-16"))?;
    match &options_storage {
        Some(options) => unsafe {
            loaded_image.set_load_options(options.as_ptr().cast::<u8>(), options.num_bytes() as u32);
        },
        None => unsafe {
            loaded_image.set_load_options(core::ptr::null(), 0);
        },
    }
    drop(loaded_image);

    match uefi::boot::start_image(image_handle) {
        Ok(()) => Ok(()),
        Err(e) if e.status() == Status::ABORTED => {
            log::debug!(
                "image {} aborted after start, treating as success",
                devpath::format_for_display(img_path)
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
