//! xv6 风格多处理器教学内核的陷阱分发层与每 CPU 软件 TLB

#![cfg_attr(not(test), no_std)]
#![warn(rust_2018_idioms)]

#[macro_use]
extern crate bitflags;

extern crate alloc;

#[macro_use]
pub mod printf;

pub mod consts;
pub mod driver;
pub mod mm;
pub mod process;
pub mod register;
pub mod spinlock;
pub mod trap;

#[cfg(test)]
mod testutil;

pub use trap::{Platform, TrapKind, TrapState};

/// 整个内核共享的陷阱状态，启动时由 CPU 0 调用
/// [`TrapState::init_trap_table`] 初始化，其余 CPU 只需装载。
pub static TRAP_STATE: TrapState = TrapState::new();
