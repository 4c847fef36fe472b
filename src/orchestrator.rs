//! Top-level discovery pipeline.
//!
//! Pre-loads auxiliary drivers from the image's own partition, builds the
//! GPT root-GUID map, scans every file-system handle for loaders, assembles
//! the menu, and runs it: a single open-once/discover-once/hand-off-to-the
//! menu pass.

use alloc::borrow::ToOwned as _;
use alloc::vec::Vec;

use log::{info, warn};
use uefi::boot::{self, SearchType};
use uefi::proto::console::text::{Input, Output};
use uefi::proto::device_path::DevicePath;
use uefi::proto::loaded_image::LoadedImage;
use uefi::proto::media::file::{Directory, File, FileMode};
use uefi::proto::media::fs::SimpleFileSystem;
use uefi::{CString16, Handle, Identify};

use crate::app::{App, AppCtx, AppResult};
use crate::chainload;
use crate::error::AppError;
use crate::fsscan;
use crate::gpt;
use crate::menu::Menu;
use crate::registry::Registry;

/// Directory on the boot partition holding drivers to load before discovery.
const DRIVER_DIR: &str = "EFI\\zbl\\drivers";

/// Run discovery, build the menu, and drive it until the user exits or the
/// process is replaced by a chain-load.
pub fn run(image_handle: Handle, output: &mut Output, input: &mut Input) -> AppResult {
    preload_own_drivers(image_handle);

    let roots = gpt::find_roots();
    info!(
        "collected {} GPT root name(s)",
        roots.iter().count()
    );

    let mut registry = Registry::new(Vec::new());
    match scan_all_filesystems(&roots, &mut registry) {
        Ok(()) => {}
        Err(e) => warn!("filesystem enumeration failed: {e}"),
    }

    let (entries, disks) = registry.build_entries(!roots.is_empty());
    info!("assembled {} menu entries", entries.len());

    let mut menu = Menu::new(entries, &disks, &roots);
    let mut ctx = AppCtx { output, input };
    menu.run(&mut ctx)
}

fn scan_all_filesystems(
    roots: &gpt::GuidNameMap,
    registry: &mut Registry,
) -> Result<(), AppError> {
    let handles = boot::locate_handle_buffer(SearchType::ByProtocol(&SimpleFileSystem::GUID))?;

    for handle in handles.iter() {
        match fsscan::scan_handle(*handle, roots, registry.disks.len()) {
            Ok(Some(result)) => {
                registry.disks.push(result.disk);
                for loader in result.loaders {
                    registry.push_loader(loader);
                }
                for kernel in result.kernels {
                    registry.push_kernel(kernel);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("skipping file-system handle: {e}"),
        }
    }

    Ok(())
}

/// Chain-load every `.efi` file in `EFI\zbl\drivers` on the partition this
/// image was loaded from, tolerating failures at every step. A missing
/// directory, handle, or protocol is not an error: most boot media simply
/// has no drivers to pre-load.
fn preload_own_drivers(image_handle: Handle) {
    let Some(device_handle) = own_device_handle(image_handle) else {
        return;
    };

    let device_path = match boot::open_protocol_exclusive::<DevicePath>(device_handle) {
        Ok(dp) => (*dp).to_owned(),
        Err(e) => {
            warn!("failed to open device path for driver pre-load: {e:?}");
            return;
        }
    };

    let Some(mut drivers_dir) = open_driver_dir(device_handle) else {
        return;
    };

    let names = fsscan::efi_file_names(&mut drivers_dir);
    if names.is_empty() {
        return;
    }
    info!("pre-loading {} driver(s) from {DRIVER_DIR}", names.len());
    chainload::preload_drivers(&device_path, &names);
}

fn own_device_handle(image_handle: Handle) -> Option<Handle> {
    match boot::open_protocol_exclusive::<LoadedImage>(image_handle) {
        Ok(loaded_image) => loaded_image.device(),
        Err(e) => {
            warn!("failed to open own LoadedImage protocol: {e:?}");
            None
        }
    }
}

fn open_driver_dir(device_handle: Handle) -> Option<Directory> {
    let mut fs = boot::open_protocol_exclusive::<SimpleFileSystem>(device_handle).ok()?;
    let mut root = fs.open_volume().ok()?;
    let path = CString16::try_from(DRIVER_DIR).ok()?;
    let handle = root
        .open(&path, FileMode::Read, uefi::proto::media::file::FileAttribute::empty())
        .ok()?;
    handle.into_directory()
}
