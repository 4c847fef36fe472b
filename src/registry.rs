//! The table of discovered loaders and the menu entries built from it.
//!
//! Discovery (`fsscan`) fills a `Vec<DiskInfo>` and a `Vec<Loader>`; this
//! module turns that into the `MenuEntry` list the interactive menu walks.
//! Every `Loader` names its `DiskInfo` by index rather than by reference:
//! discovery collects results disk-by-disk into owned `Vec`s, and an index
//! is cheaper to thread through that collection than fighting the borrow
//! checker over a self-referential table.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use alloc::boxed::Box;
use uefi::proto::device_path::DevicePath;

use crate::gpt::GuidNameMap;

/// A mounted volume a loader was discovered under.
pub struct DiskInfo {
    pub device_path: Box<DevicePath>,
    pub label: String,
}

/// A candidate bootable image found during discovery.
pub struct Loader {
    pub file_name: String,
    pub disk_index: usize,
    pub args: Option<String>,
}

/// A Linux kernel found without a `.conf` sidecar: the user picks which
/// root partition to boot it against from the `GuidNameMap`.
pub struct KernelDescriptor {
    pub kernel_file_name: String,
    pub initrd_path: String,
    pub disk_index: usize,
}

impl KernelDescriptor {
    /// Build the kernel argument string for a chosen root partition.
    pub fn args_for(&self, root_guid_text: &str) -> String {
        format!(
            "ro root=PARTUUID={root_guid_text} initrd={}",
            self.initrd_path
        )
    }
}

/// The action a menu entry performs when selected.
///
/// Replaces an opaque-pointer-plus-vtable callback with a closed sum type:
/// dispatch in the menu is a plain `match`, not a dynamic call.
pub enum Action {
    ChainLoad(Loader),
    PickRootFor(KernelDescriptor),
    RebootFirmware,
    PrintRoots,
    Back,
}

pub struct MenuEntry {
    pub description: String,
    pub action: Action,
}

/// Builds the final, ordered list of menu entries from discovery results.
pub struct Registry {
    pub disks: Vec<DiskInfo>,
    loaders: Vec<Loader>,
    kernels: Vec<KernelDescriptor>,
}

impl Registry {
    pub fn new(disks: Vec<DiskInfo>) -> Self {
        Self {
            disks,
            loaders: Vec::new(),
            kernels: Vec::new(),
        }
    }

    pub fn push_loader(&mut self, loader: Loader) {
        self.loaders.push(loader);
    }

    pub fn push_kernel(&mut self, kernel: KernelDescriptor) {
        self.kernels.push(kernel);
    }

    /// Synthesize `"<disk label>: <file name>"` entries for every loader,
    /// a submenu entry for every sidecar-less kernel, and append the fixed
    /// tail entries (reboot to firmware, a debugging root-map dump, exit).
    pub fn build_entries(self, roots_known: bool) -> (Vec<MenuEntry>, Vec<DiskInfo>) {
        let Registry {
            disks,
            loaders,
            kernels,
        } = self;

        let mut entries = Vec::with_capacity(loaders.len() + kernels.len() + 3);

        for loader in loaders {
            let label = disks
                .get(loader.disk_index)
                .map(|d| d.label.as_str())
                .unwrap_or("unknown disk");
            let description = format!("{label}: {}", loader.file_name);
            entries.push(MenuEntry {
                description,
                action: Action::ChainLoad(loader),
            });
        }

        for kernel in kernels {
            let label = disks
                .get(kernel.disk_index)
                .map(|d| d.label.as_str())
                .unwrap_or("unknown disk");
            let description = format!("{label}: {} (choose root)", kernel.kernel_file_name);
            entries.push(MenuEntry {
                description,
                action: Action::PickRootFor(kernel),
            });
        }

        entries.push(MenuEntry {
            description: String::from("Reboot into firmware"),
            action: Action::RebootFirmware,
        });
        if roots_known {
            entries.push(MenuEntry {
                description: String::from("Print roots"),
                action: Action::PrintRoots,
            });
        }
        entries.push(MenuEntry {
            description: String::from("Exit"),
            action: Action::Back,
        });

        (entries, disks)
    }
}

/// Build the submenu entries for picking a root partition against a
/// previously discovered kernel.
pub fn root_picker_entries(roots: &GuidNameMap) -> Vec<(String, String)> {
    roots
        .iter()
        .map(|(guid, name)| (format!("{name} ({guid})"), format!("{guid}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_descriptor_formats_root_args() {
        let kernel = KernelDescriptor {
            kernel_file_name: String::from("vmlinuz-linux"),
            initrd_path: String::from("\\initramfs-linux.img"),
            disk_index: 0,
        };
        assert_eq!(
            kernel.args_for("1234"),
            "ro root=PARTUUID=1234 initrd=\\initramfs-linux.img"
        );
    }

    #[test]
    fn build_entries_appends_fixed_tail() {
        let registry = Registry::new(Vec::new());
        let (entries, _disks) = registry.build_entries(true);
        let descriptions: Vec<&str> = entries.iter().map(|e| e.description.as_str()).collect();
        assert_eq!(
            descriptions,
            ["Reboot into firmware", "Print roots", "Exit"]
        );
    }

    #[test]
    fn build_entries_omits_print_roots_when_unknown() {
        let registry = Registry::new(Vec::new());
        let (entries, _disks) = registry.build_entries(false);
        let descriptions: Vec<&str> = entries.iter().map(|e| e.description.as_str()).collect();
        assert_eq!(descriptions, ["Reboot into firmware", "Exit"]);
    }
}
