//! Per-volume discovery: walk a mounted file system for bootable loaders.
//!
//! Built on `uefi::proto::media::file::Directory::read_entry_boxed`'s
//! buffer-fill/zero-size-means-done contract; this module owns only the
//! traversal policy layered on top of it (which file names match which
//! discovery rule).

use alloc::borrow::ToOwned as _;
use alloc::boxed::Box;
use alloc::format;
use alloc::string::{String, ToString as _};
use alloc::vec::Vec;

use log::warn;
use uefi::boot;
use uefi::proto::device_path::media::{HardDrive, PartitionSignature};
use uefi::proto::device_path::{DevicePath, DeviceSubType, DeviceType};
use uefi::proto::media::file::{Directory, File, FileInfo, FileMode, FileType};
use uefi::proto::media::fs::SimpleFileSystem;
use uefi::{CStr16, CString16, Handle};

use crate::error::AppError;
use crate::gpt::GuidNameMap;
use crate::registry::{DiskInfo, KernelDescriptor, Loader};

const LINUX_KERNEL_PREFIXES: [&str; 2] = ["vmlinuz-", "vmlinuz"];

/// Result of scanning a single volume: the disk metadata, every loader
/// found on it, and every sidecar-less kernel found on it.
pub struct ScanResult {
    pub disk: DiskInfo,
    pub loaders: Vec<Loader>,
    pub kernels: Vec<KernelDescriptor>,
}

/// Scan one file-system handle for bootable loaders.
///
/// Returns `Ok(None)` (not an error) when the handle's device path carries
/// no GPT-signed `Media/HardDrive` record; the caller should simply skip
/// this handle rather than treat it as a scan failure.
pub fn scan_handle(
    handle: Handle,
    roots: &GuidNameMap,
    disk_index: usize,
) -> Result<Option<ScanResult>, AppError> {
    let device_path = boot::open_protocol_exclusive::<DevicePath>(handle)?;
    let Some(partition_guid) = find_partition_guid(&device_path) else {
        warn!("skipping file-system handle with no GPT HardDrive record");
        return Ok(None);
    };
    let owned_device_path = (*device_path).to_owned();

    let mut fs = boot::open_protocol_exclusive::<SimpleFileSystem>(handle)?;
    let mut root = fs.open_volume()?;
    let volume_label = read_volume_label(&mut root);

    let label = match (volume_label, roots.get(&partition_guid)) {
        (Some(v), Some(root_name)) if !v.is_empty() => format!("{v} - {root_name}"),
        (Some(v), _) if !v.is_empty() => v,
        (_, Some(root_name)) => root_name.to_string(),
        _ => format!("{partition_guid}"),
    };

    let disk = DiskInfo {
        device_path: owned_device_path,
        label,
    };

    let mut loaders = Vec::new();
    let mut kernels = Vec::new();

    scan_efi_images(&mut root, "", disk_index, &mut loaders);
    scan_linux_kernels(&mut root, "", disk_index, &mut loaders, &mut kernels);
    scan_efi_subdirs(&mut root, disk_index, &mut loaders);

    if let Some(mut boot_dir) = open_subdir(&mut root, "boot") {
        scan_linux_kernels(&mut boot_dir, "boot\\", disk_index, &mut loaders, &mut kernels);
    }

    probe_known_path(&mut root, "EFI\\Microsoft\\Boot\\bootmgfw.efi", disk_index, &mut loaders);
    probe_known_path(&mut root, "System\\Library\\CoreServices\\boot.efi", disk_index, &mut loaders);

    Ok(Some(ScanResult {
        disk,
        loaders,
        kernels,
    }))
}

/// Names of every non-directory `.efi`/`.EFI` entry directly inside `dir`.
///
/// Used by the driver pre-load pass, which needs firmware-ready `CString16`
/// names rather than `Loader` records.
pub fn efi_file_names(dir: &mut Directory) -> Vec<CString16> {
    read_all_entries(dir)
        .into_iter()
        .filter(|(name, is_dir)| !is_dir && (name.ends_with(".efi") || name.ends_with(".EFI")))
        .filter_map(|(name, _)| CString16::try_from(name.as_str()).ok())
        .collect()
}

fn find_partition_guid(path: &DevicePath) -> Option<uefi::Guid> {
    for node in path.node_iter() {
        if node.full_type() != (DeviceType::MEDIA, DeviceSubType::MEDIA_HARD_DRIVE) {
            continue;
        }
        let hard_drive: &HardDrive = node.try_into().ok()?;
        if let PartitionSignature::Guid(guid) = hard_drive.partition_signature() {
            return Some(guid);
        }
    }
    None
}

fn read_volume_label(root: &mut Directory) -> Option<String> {
    root.get_boxed_info::<uefi::proto::media::file::FileSystemVolumeLabel>()
        .ok()
        .map(|info| info.volume_label().to_string())
}

/// Rule 4: emit a Loader for each non-directory `.efi`/`.EFI` entry at the
/// root of `dir`, skipping macOS `._` sidecar files.
fn scan_efi_images(dir: &mut Directory, path_prefix: &str, disk_index: usize, loaders: &mut Vec<Loader>) {
    let _ = dir.reset_entry_readout();
    while let Some(entry) = next_entry(dir) {
        let name = entry.file_name().to_string();
        if entry.attribute().contains(uefi::proto::media::file::FileAttribute::DIRECTORY) {
            continue;
        }
        if name.starts_with("._") {
            continue;
        }
        if name.ends_with(".efi") || name.ends_with(".EFI") {
            loaders.push(Loader {
                file_name: format!("{path_prefix}{name}"),
                disk_index,
                args: None,
            });
        }
    }
}

/// Rule 5: Linux kernel + initrd pairing, with an optional `.conf` sidecar.
fn scan_linux_kernels(
    dir: &mut Directory,
    path_prefix: &str,
    disk_index: usize,
    loaders: &mut Vec<Loader>,
    kernels: &mut Vec<KernelDescriptor>,
) {
    let entries = read_all_entries(dir);

    for (fname, is_dir) in &entries {
        if *is_dir {
            continue;
        }
        let Some(prefix) = LINUX_KERNEL_PREFIXES
            .iter()
            .find(|p| fname.starts_with(**p) && !fname.ends_with(".conf"))
        else {
            continue;
        };
        let suffix = &fname[prefix.len()..];

        let initrd_candidates = [
            format!("initramfs-{suffix}.img"),
            format!("initrd-{suffix}.img"),
            format!("init-{suffix}.img"),
            format!("init{suffix}.img"),
        ];
        let Some(initrd) = initrd_candidates
            .iter()
            .find(|cand| entries.iter().any(|(n, _)| n == *cand))
        else {
            continue;
        };
        let initrd_path = format!("{path_prefix}{initrd}");
        let kernel_path = format!("{path_prefix}{fname}");

        let conf_name = format!("{fname}.conf");
        let args = entries
            .iter()
            .any(|(n, _)| n == &conf_name)
            .then(|| read_conf_args(dir, &conf_name, &initrd_path))
            .flatten();

        match args {
            Some(args) => loaders.push(Loader {
                file_name: kernel_path,
                disk_index,
                args: Some(args),
            }),
            None => {
                kernels.push(KernelDescriptor {
                    kernel_file_name: kernel_path,
                    initrd_path,
                    disk_index,
                });
            }
        }
    }
}

/// Rule 6: `EFI/<x>/` subdirectory scan.
fn scan_efi_subdirs(root: &mut Directory, disk_index: usize, loaders: &mut Vec<Loader>) {
    let Some(mut efi_dir) = open_subdir(root, "EFI") else {
        return;
    };
    let subdirs = read_all_entries(&mut efi_dir);
    for (name, is_dir) in subdirs {
        if !is_dir {
            continue;
        }
        if let Some(mut subdir) = open_subdir(&mut efi_dir, &name) {
            scan_efi_images(&mut subdir, &format!("EFI\\{name}\\"), disk_index, loaders);
        }
    }
}

fn probe_known_path(root: &mut Directory, path: &str, disk_index: usize, loaders: &mut Vec<Loader>) {
    if file_exists(root, path) {
        loaders.push(Loader {
            file_name: String::from(path),
            disk_index,
            args: None,
        });
    }
}

fn file_exists(root: &mut Directory, path: &str) -> bool {
    let Ok(cpath) = CString16::try_from(path) else {
        return false;
    };
    match root.open(&cpath, FileMode::Read, uefi::proto::media::file::FileAttribute::empty()) {
        Ok(handle) => {
            drop(handle);
            true
        }
        Err(_) => false,
    }
}

fn open_subdir(dir: &mut Directory, name: &str) -> Option<Directory> {
    let cname = CString16::try_from(name).ok()?;
    let handle = dir.open(&cname, FileMode::Read, uefi::proto::media::file::FileAttribute::empty()).ok()?;
    handle.into_directory()
}

fn read_conf_args(dir: &mut Directory, conf_name: &str, initrd_path: &str) -> Option<String> {
    let cname = CString16::try_from(conf_name).ok()?;
    let handle = dir.open(&cname, FileMode::Read, uefi::proto::media::file::FileAttribute::empty()).ok()?;
    let mut file = match handle.into_type().ok()? {
        FileType::Regular(f) => f,
        FileType::Dir(_) => return None,
    };

    let info: Box<FileInfo> = file.get_boxed_info().ok()?;
    let mut buf = alloc::vec![0u8; info.file_size() as usize];
    let read = file.read(&mut buf).ok()?;
    buf.truncate(read);

    let mut text = String::from_utf8(buf).ok()?;
    if text.ends_with("\r\n") {
        text.truncate(text.len() - 2);
    } else if text.ends_with('\n') {
        text.truncate(text.len() - 1);
    }

    Some(format!("{text} initrd={initrd_path}"))
}

fn next_entry(dir: &mut Directory) -> Option<Box<FileInfo>> {
    match dir.read_entry_boxed() {
        Ok(Some(info)) => {
            let name = info.file_name();
            if name == cstr16_dot() || name == cstr16_dotdot() {
                return next_entry(dir);
            }
            Some(info)
        }
        Ok(None) => None,
        Err(e) => {
            warn!("directory read failed: {e:?}");
            None
        }
    }
}

fn read_all_entries(dir: &mut Directory) -> Vec<(String, bool)> {
    let _ = dir.reset_entry_readout();
    let mut out = Vec::new();
    while let Some(entry) = next_entry(dir) {
        let is_dir = entry
            .attribute()
            .contains(uefi::proto::media::file::FileAttribute::DIRECTORY);
        out.push((entry.file_name().to_string(), is_dir));
    }
    out
}

fn cstr16_dot() -> &'static CStr16 {
    uefi::cstr16!(".")
}

fn cstr16_dotdot() -> &'static CStr16 {
    uefi::cstr16!("..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_suffix_strips_prefix() {
        let fname = "vmlinuz-linux";
        let prefix = LINUX_KERNEL_PREFIXES
            .iter()
            .find(|p| fname.starts_with(**p))
            .unwrap();
        assert_eq!(&fname[prefix.len()..], "linux");
    }

    #[test]
    fn initrd_candidate_names_match_spec_patterns() {
        let suffix = "linux";
        let candidates = [
            format!("initramfs-{suffix}.img"),
            format!("initrd-{suffix}.img"),
            format!("init-{suffix}.img"),
            format!("init{suffix}.img"),
        ];
        assert_eq!(candidates[0], "initramfs-linux.img");
        assert_eq!(candidates[3], "initlinux.img");
    }

    #[test]
    fn conf_trailing_newline_is_stripped() {
        let mut text = String::from("root=/dev/sda1\r\n");
        if text.ends_with("\r\n") {
            text.truncate(text.len() - 2);
        }
        assert_eq!(text, "root=/dev/sda1");
    }
}
