//! Build-time configuration for the simulator.
//! Values come from `flags.json` at the workspace root and are emitted as
//! one module per section, e.g. [registry::MAX_DEVICES].

#![no_std]
#![deny(missing_docs)]
#![deny(warnings)]

include!(concat!(env!("OUT_DIR"), "/build_flags.rs"));

// Compile-time checks on the generated values.
const _: () = {
    assert!(registry::MAX_DEVICES > 0);
    // Handles keep the slot index in the low 32 bits.
    assert!((registry::MAX_DEVICES as u64) < (1u64 << 32));
    assert!(component::MAX_COMPONENTS as u64 <= u32::MAX as u64);
    assert!(component::DEFAULT_RESET_DELAY_MS as u64 <= u32::MAX as u64);
    assert!(logging::DEFAULT_LEVEL <= 5);
};
