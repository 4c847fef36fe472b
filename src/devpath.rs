//! Device path parsing (for display) and synthesis (append a file path).
//!
//! Device paths are firmware-defined, variable-length chains of typed
//! records. This module owns two directions: a hand-rolled cursor that
//! renders a chain as a human-readable string, and a thin wrapper over the
//! firmware's own builder that appends a `Media/FilePath` node naming a file
//! on the same device.

use alloc::string::{String, ToString as _};
use uefi::CStr16;
use uefi::proto::device_path::build::{self, DevicePathBuilder};
use uefi::proto::device_path::{DevicePath, DevicePathNode, DeviceSubType, DeviceType, media};

use crate::error::AppError;

/// Render a device path as a `\`-separated sequence of tokens, one per node.
///
/// This never touches the firmware's `DevicePathToText` protocol: it walks
/// the raw node chain directly so discovery and menu rendering keep working
/// even under firmware that doesn't implement that protocol.
pub fn format_for_display(path: &DevicePath) -> String {
    let mut tokens = alloc::vec::Vec::new();
    for node in path.node_iter() {
        tokens.push(format_node(node));
    }
    tokens.join("\\")
}

fn format_node(node: &DevicePathNode) -> String {
    match node.full_type() {
        (DeviceType::MEDIA, DeviceSubType::MEDIA_FILE_PATH) => {
            format_file_path_node(node).unwrap_or_else(|| String::from("FilePath"))
        }
        (DeviceType::MEDIA, DeviceSubType::MEDIA_HARD_DRIVE) => String::from("HardDrive"),
        (DeviceType::MEDIA, DeviceSubType::MEDIA_CD_ROM) => String::from("CdRom"),
        (DeviceType::HARDWARE, DeviceSubType::HARDWARE_PCI) => String::from("Pci"),
        (DeviceType::HARDWARE, DeviceSubType::HARDWARE_VENDOR) => String::from("Vendor"),
        (DeviceType::ACPI, _) => String::from("Acpi"),
        (DeviceType::MESSAGING, _) => String::from("Msg"),
        _ => String::from("?"),
    }
}

fn format_file_path_node(node: &DevicePathNode) -> Option<String> {
    let file_path: &media::FilePath = node.try_into().ok()?;
    file_path.path_name().to_cstring16().ok().map(|s| s.to_string())
}

/// Append a `Media/FilePath` node naming `file_name` to `base`, returning a
/// freshly allocated device path rooted at the same device.
///
/// The node is built with `DevicePathBuilder`, then glued onto `base` via
/// `DevicePath::append_path`, which measures and extends the chain up to and
/// including a fresh `End` terminator.
pub fn synthesize_file_path(
    base: &DevicePath,
    file_name: &CStr16,
) -> Result<uefi::proto::device_path::PoolDevicePath, AppError> {
    let mut buf = alloc::vec::Vec::new();
    let tail = DevicePathBuilder::with_vec(&mut buf)
        .push(&build::media::FilePath {
            path_name: file_name,
        })?
        .finalize()?;

    Ok(base.append_path(tail)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    // Type 0x01 (HARDWARE) / subtype 0x04 (VENDOR), type 0x7F (END) / subtype
    // 0xFF (END_ENTIRE) -- numeric values per the UEFI device path spec, also
    // exercised byte-for-byte in `uefi::proto::device_path::build`'s own
    // test module.
    const END_ENTIRE: [u8; 4] = [0x7F, 0xFF, 4, 0];

    #[test]
    fn format_for_display_stops_before_end_entire() {
        let mut bytes: Vec<u8> = alloc::vec![0x01, 0x04, 4, 0];
        bytes.extend_from_slice(&END_ENTIRE);

        let path: &DevicePath = (&bytes[..]).try_into().unwrap();
        let rendered = format_for_display(path);
        assert_eq!(rendered, "Vendor");
    }

    #[test]
    fn unknown_node_renders_as_question_mark() {
        // type 0x06 has no case in format_node's match.
        let mut bytes: Vec<u8> = alloc::vec![0x06, 0x01, 4, 0];
        bytes.extend_from_slice(&END_ENTIRE);

        let path: &DevicePath = (&bytes[..]).try_into().unwrap();
        assert_eq!(format_for_display(path), "?");
    }
}
