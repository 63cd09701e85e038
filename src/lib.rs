//! HCI driver for the EM Microelectronic EM9301 BLE controller.
//!
//! Provides the bit-banged SPI HCI transport and the post-reset controller
//! bring-up sequence. Built on `embedded-hal` digital pin and delay traits
//! so it stays portable across host MCUs.

#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod bluetooth;
