#![no_main]
#![no_std]

//! Entry point for the boot menu.
//!
//! Initializes UEFI helpers, opens the console protocols, runs the
//! discovery-and-menu pipeline, and returns a status reflecting how it
//! ended.

extern crate alloc;

use log::info;
use uefi::{
    prelude::*,
    proto::console::text::{Input, Output},
};
use zbl_menu::app::AppResult;
use zbl_menu::orchestrator;

#[entry]
fn main() -> Status {
    uefi::helpers::init().unwrap();
    info!("Initialized UEFI helpers successfully.");

    let handle = boot::image_handle();

    let output_handle = match boot::get_handle_for_protocol::<Output>() {
        Ok(h) => h,
        Err(e) => {
            log::error!("no text output protocol available: {e:?}");
            return Status::UNSUPPORTED;
        }
    };
    let mut output = match boot::open_protocol_exclusive::<Output>(output_handle) {
        Ok(o) => o,
        Err(e) => {
            log::error!("failed to open text output protocol: {e:?}");
            return Status::UNSUPPORTED;
        }
    };

    let input_handle = match boot::get_handle_for_protocol::<Input>() {
        Ok(h) => h,
        Err(e) => {
            log::error!("no text input protocol available: {e:?}");
            return Status::UNSUPPORTED;
        }
    };
    let mut input = match boot::open_protocol_exclusive::<Input>(input_handle) {
        Ok(i) => i,
        Err(e) => {
            log::error!("failed to open text input protocol: {e:?}");
            return Status::UNSUPPORTED;
        }
    };

    match orchestrator::run(handle, &mut output, &mut input) {
        AppResult::Done => Status::SUCCESS,
        AppResult::Error(err) => {
            log::error!("unrecoverable error: {err}");
            Status::ABORTED
        }
    }
}
