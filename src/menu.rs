//! The interactive, full-screen text menu and its error overlay.
//!
//! A wraparound Up/Down, Enter-to-dispatch loop driven against
//! `uefi::proto::console::text::{Input, Output}`; a selected entry's `Action`
//! is a closed sum type rather than a callback, so dispatch is a plain
//! `match`. An error from a dispatched action is shown for one second, then
//! the menu redraws and resumes.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use log::{info, warn};
use uefi::proto::console::text::{Color, Key, Output, ScanCode};
use uefi::runtime::{self, ResetType, VariableAttributes, VariableVendor};
use uefi::{CString16, Status, boot, cstr16};

use crate::app::{App, AppCtx, AppResult};
use crate::chainload;
use crate::error::AppError;
use crate::gpt::GuidNameMap;
use crate::registry::{self, Action, DiskInfo, Loader, MenuEntry};

/// Bit in `OsIndications` requesting the firmware setup UI on next boot.
const BOOT_TO_FW_UI: u64 = 0x01;

/// The main, full-screen menu: navigate with arrow keys, Enter dispatches
/// the highlighted entry, Escape powers the machine off.
pub struct Menu<'a> {
    entries: Vec<MenuEntry>,
    disks: &'a [DiskInfo],
    roots: &'a GuidNameMap,
    highlighted: usize,
}

/// What to do after a selected entry's callback returns.
enum Dispatch {
    /// Redraw and keep waiting for input.
    Resume,
    /// The user chose "Exit"; the menu loop should return.
    Exit,
}

impl<'a> Menu<'a> {
    pub fn new(entries: Vec<MenuEntry>, disks: &'a [DiskInfo], roots: &'a GuidNameMap) -> Self {
        Self {
            entries,
            disks,
            roots,
            highlighted: 0,
        }
    }

    fn render(&self, output: &mut Output) -> Result<(), AppError> {
        render_list(
            output,
            self.entries.iter().map(|e| e.description.as_str()),
            self.entries.len(),
            self.highlighted,
        )
    }

    fn move_up(&mut self) {
        self.highlighted = if self.highlighted == 0 {
            self.entries.len() - 1
        } else {
            self.highlighted - 1
        };
    }

    fn move_down(&mut self) {
        self.highlighted = (self.highlighted + 1) % self.entries.len();
    }

    fn dispatch_selected(&mut self, ctx: &mut AppCtx) -> Dispatch {
        let idx = self.highlighted;
        let result = match &self.entries[idx].action {
            Action::ChainLoad(loader) => self.chain_load(loader),
            Action::PickRootFor(kernel) => pick_root_and_boot(ctx, kernel, self.roots, self.disks),
            Action::RebootFirmware => reboot_into_firmware(),
            Action::PrintRoots => {
                show_roots(ctx.output, self.roots);
                Ok(())
            }
            Action::Back => return Dispatch::Exit,
        };

        if let Err(e) = result {
            warn!("menu entry action failed: {e}");
            show_error(ctx.output, &e);
        }
        Dispatch::Resume
    }

    fn chain_load(&self, loader: &Loader) -> Result<(), AppError> {
        let disk = self
            .disks
            .get(loader.disk_index)
            .ok_or(AppError::MissingDevicePathNode)?;
        chainload::boot_loader(loader, disk)
    }
}

impl<'a> App for Menu<'a> {
    fn run(&mut self, ctx: &mut AppCtx) -> AppResult {
        if self.entries.is_empty() {
            return AppResult::Error(AppError::Generic("no menu entries to display"));
        }

        loop {
            if let Err(e) = self.render(ctx.output) {
                return AppResult::Error(e);
            }

            match wait_for_key(ctx) {
                Ok(Key::Special(ScanCode::UP)) => self.move_up(),
                Ok(Key::Special(ScanCode::DOWN)) => self.move_down(),
                Ok(Key::Special(ScanCode::ESCAPE)) => power_off(),
                Ok(Key::Printable(c)) if char::from(c) == '\r' || char::from(c) == '\n' => {
                    match self.dispatch_selected(ctx) {
                        Dispatch::Resume => {}
                        Dispatch::Exit => return AppResult::Done,
                    }
                }
                Ok(_) => {}
                Err(e) => return AppResult::Error(e),
            }
        }
    }
}

/// Render `items` centered on screen, highlighting `highlighted` with
/// inverted attributes (light-gray background, black foreground).
fn render_list<'i>(
    output: &mut Output,
    items: impl Iterator<Item = &'i str>,
    count: usize,
    highlighted: usize,
) -> Result<(), AppError> {
    output.clear()?;
    let mode = output
        .current_mode()?
        .ok_or(AppError::Generic("console has no active text mode"))?;
    let (cols, rows) = (mode.columns(), mode.rows());
    let center_x = cols / 2;
    let center_y = rows / 2;

    for (i, desc) in items.enumerate() {
        let len = desc.chars().count();
        let col = center_x.saturating_sub(len / 2).min(cols.saturating_sub(1));
        let row = center_y + i;
        let row = row.saturating_sub(count / 2);
        if row >= rows {
            continue;
        }

        output.set_cursor_position(col, row)?;
        if i == highlighted {
            output.set_color(Color::Black, Color::LightGray)?;
        } else {
            output.set_color(Color::White, Color::Black)?;
        }
        let text = CString16::try_from(desc)
            .map_err(|_| AppError::Generic("menu entry is not valid UTF-16"))?;
        output.output_string_lossy(&text)?;
    }

    output.set_color(Color::White, Color::Black)?;
    Ok(())
}

fn wait_for_key(ctx: &mut AppCtx) -> Result<Key, AppError> {
    loop {
        let mut events = [unsafe { ctx.input.wait_for_key_event().unsafe_clone() }];
        boot::wait_for_event(&mut events).map_err(|e| AppError::from(e.status()))?;
        if let Some(key) = ctx.input.read_key()? {
            return Ok(key);
        }
    }
}

/// A kernel found without a `.conf` sidecar gets a nested submenu listing
/// every known GPT root partition; picking one synthesizes the
/// `root=PARTUUID=` argument and chain-loads.
fn pick_root_and_boot(
    ctx: &mut AppCtx,
    kernel: &crate::registry::KernelDescriptor,
    roots: &GuidNameMap,
    disks: &[DiskInfo],
) -> Result<(), AppError> {
    let picks = registry::root_picker_entries(roots);
    if picks.is_empty() {
        return Err(AppError::Generic("no known root partitions to choose from"));
    }

    let mut highlighted = 0usize;
    loop {
        render_list(
            ctx.output,
            picks.iter().map(|(label, _)| label.as_str()),
            picks.len(),
            highlighted,
        )?;

        match wait_for_key(ctx)? {
            Key::Special(ScanCode::UP) => {
                highlighted = if highlighted == 0 {
                    picks.len() - 1
                } else {
                    highlighted - 1
                };
            }
            Key::Special(ScanCode::DOWN) => highlighted = (highlighted + 1) % picks.len(),
            Key::Special(ScanCode::ESCAPE) => power_off(),
            Key::Printable(c) if char::from(c) == '\r' || char::from(c) == '\n' => {
                let (_, guid_text) = &picks[highlighted];
                let args = kernel.args_for(guid_text);
                let loader = Loader {
                    file_name: kernel.kernel_file_name.clone(),
                    disk_index: kernel.disk_index,
                    args: Some(args),
                };
                let disk = disks
                    .get(kernel.disk_index)
                    .ok_or(AppError::MissingDevicePathNode)?;
                return chainload::boot_loader(&loader, disk);
            }
            _ => {}
        }
    }
}

/// The debugging entry: dump the discovered GUID-to-name root map.
fn show_roots(output: &mut Output, roots: &GuidNameMap) {
    let mut lines: Vec<String> = roots
        .iter()
        .map(|(guid, name)| format!("{guid}: {name}"))
        .collect();
    if lines.is_empty() {
        lines.push(String::from("(no GPT roots discovered)"));
    }
    for line in &lines {
        info!("{line}");
    }

    if output.clear().is_err() {
        return;
    }
    let _ = output.set_color(Color::White, Color::Black);
    for (row, line) in lines.iter().enumerate() {
        if output.set_cursor_position(0, row).is_err() {
            break;
        }
        if let Ok(text) = CString16::try_from(line.as_str()) {
            let _ = output.output_string_lossy(&text);
        }
    }
    boot::stall(1_000_000);
}

/// Display a callback error for one second, then let the caller redraw.
fn show_error(output: &mut Output, err: &AppError) {
    if output.clear().is_err() {
        return;
    }
    let _ = output.set_color(Color::White, Color::Red);
    let _ = output.set_cursor_position(0, 0);
    let msg = format!("Error: {err}");
    if let Ok(text) = CString16::try_from(msg.as_str()) {
        let _ = output.output_string_lossy(&text);
    }
    let _ = output.set_color(Color::White, Color::Black);
    boot::stall(1_000_000);
}

/// Set the `OsIndications` bit requesting the firmware setup UI, then cold
/// reset. A `get` miss defaults to 0 (the variable may not exist yet); a
/// `set` failure is surfaced to the caller as an `AppError`.
fn reboot_into_firmware() -> Result<(), AppError> {
    let name = cstr16!("OsIndications");
    let vendor = VariableVendor::GLOBAL_VARIABLE;

    let mut buf = [0u8; 8];
    let current = match runtime::get_variable(name, &vendor, &mut buf) {
        Ok((data, _attrs)) => {
            let mut val = [0u8; 8];
            let n = data.len().min(8);
            val[..n].copy_from_slice(&data[..n]);
            u64::from_le_bytes(val)
        }
        Err(_) => 0,
    };

    let updated = current | BOOT_TO_FW_UI;
    let attrs = VariableAttributes::NON_VOLATILE
        | VariableAttributes::BOOTSERVICE_ACCESS
        | VariableAttributes::RUNTIME_ACCESS;
    runtime::set_variable(name, &vendor, attrs, &updated.to_le_bytes())?;

    runtime::reset(ResetType::COLD, Status::SUCCESS, None);
}

/// Escape: power off via a graceful firmware shutdown reset. Never returns.
fn power_off() -> ! {
    info!("Escape pressed, shutting down");
    runtime::reset(ResetType::SHUTDOWN, Status::SUCCESS, None);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_wraparound_up_from_zero_lands_on_last() {
        let n = 4usize;
        let mut highlighted = 0usize;
        highlighted = if highlighted == 0 { n - 1 } else { highlighted - 1 };
        assert_eq!(highlighted, 3);
    }

    #[test]
    fn menu_wraparound_down_from_last_lands_on_zero() {
        let n = 4usize;
        let mut highlighted = n - 1;
        highlighted = (highlighted + 1) % n;
        assert_eq!(highlighted, 0);
    }

    #[test]
    fn menu_highlight_stays_in_bounds_for_full_cycle() {
        let n = 5usize;
        let mut highlighted = 0usize;
        for _ in 0..2 * n {
            highlighted = (highlighted + 1) % n;
            assert!(highlighted < n);
        }
    }
}
