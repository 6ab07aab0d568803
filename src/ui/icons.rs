//! Shared UI icons.
//!
//! Each icon falls back to plain ASCII on terminals without emoji support.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("\u{2705} ", "[OK] ");
pub static CROSS: Emoji<'_, '_> = Emoji("\u{274C} ", "[ERR] ");
pub static SPARKLE: Emoji<'_, '_> = Emoji("\u{2728} ", "* ");

// Connection indicators
pub static PLUG: Emoji<'_, '_> = Emoji("\u{1F50C} ", "[~] ");
pub static BROKEN: Emoji<'_, '_> = Emoji("\u{1F6AB} ", "[X] ");

// Content indicators
pub static COMMENT: Emoji<'_, '_> = Emoji("\u{1F4AC} ", "+ ");
pub static EDIT: Emoji<'_, '_> = Emoji("\u{270F}\u{FE0F} ", "~ ");
pub static NOTE: Emoji<'_, '_> = Emoji("\u{1F4DD} ", "# ");
