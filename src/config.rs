// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! The crate's sole configuration surface. There is no argv/env parsing
//! here — a caller maps its own flags, config file, or test fixture onto
//! [`Config`] fields itself.

use crate::types::ValType;

/// Default page size, in KiB, for one allocated heap page.
pub const DEFAULT_PAGE_SIZE_KIB: u32 = 64;

/// Compile-time configuration threaded through every lowering pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    /// The module-wide numeric payload representation.
    pub valtype: ValType,
    /// Size in KiB of one allocated heap page.
    pub page_size_kib: u32,
    /// Emit `br_table` for type switches instead of an if-else chain.
    pub typeswitch_use_brtable: bool,
    /// Annotate string-only instruction runs with [`crate::types::InstrFlag`]
    /// for a later pruning pass, rather than emitting them unconditionally.
    pub well_formed_string_approximation: bool,
    /// Dump the input AST to the `log` facade at debug level before lowering.
    pub ast_log: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            valtype: ValType::default(),
            page_size_kib: DEFAULT_PAGE_SIZE_KIB,
            typeswitch_use_brtable: false,
            well_formed_string_approximation: false,
            ast_log: false,
        }
    }
}

impl Config {
    /// Page size in bytes.
    pub fn page_size_bytes(&self) -> u32 {
        self.page_size_kib * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.valtype, ValType::F64);
        assert_eq!(config.page_size_kib, 64);
        assert!(!config.typeswitch_use_brtable);
        assert!(!config.well_formed_string_approximation);
        assert!(!config.ast_log);
    }

    #[test]
    fn page_size_bytes_converts_kib() {
        let config = Config { page_size_kib: 4, ..Config::default() };
        assert_eq!(config.page_size_bytes(), 4096);
    }
}
