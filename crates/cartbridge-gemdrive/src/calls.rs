//! Trap-number telemetry: names for the calls the target reports through
//! the show-vector-call command.

/// GEMDOS call names by trap number. Gaps are calls the system never routes
/// this way.
pub const GEMDOS_CALLS: [&str; 93] = [
    "Pterm0",    // 0x00
    "Conin",     // 0x01
    "Cconout",   // 0x02
    "Cauxin",    // 0x03
    "Cauxout",   // 0x04
    "Cprnout",   // 0x05
    "Crawio",    // 0x06
    "Crawcin",   // 0x07
    "Cnecin",    // 0x08
    "Cconws",    // 0x09
    "Cconrs",    // 0x0A
    "Cconis",    // 0x0B
    "",          // 0x0C
    "",          // 0x0D
    "Dsetdrv",   // 0x0E
    "",          // 0x0F
    "Cconos",    // 0x10
    "Cprnos",    // 0x11
    "Cauxis",    // 0x12
    "Cauxos",    // 0x13
    "Maddalt",   // 0x14
    "",          // 0x15
    "",          // 0x16
    "",          // 0x17
    "",          // 0x18
    "Dgetdrv",   // 0x19
    "Fsetdta",   // 0x1A
    "",          // 0x1B
    "",          // 0x1C
    "",          // 0x1D
    "",          // 0x1E
    "",          // 0x1F
    "Super",     // 0x20
    "",          // 0x21
    "",          // 0x22
    "",          // 0x23
    "",          // 0x24
    "",          // 0x25
    "",          // 0x26
    "",          // 0x27
    "",          // 0x28
    "",          // 0x29
    "Tgetdate",  // 0x2A
    "Tsetdate",  // 0x2B
    "Tgettime",  // 0x2C
    "Tsettime",  // 0x2D
    "",          // 0x2E
    "Fgetdta",   // 0x2F
    "Sversion",  // 0x30
    "Ptermres",  // 0x31
    "",          // 0x32
    "",          // 0x33
    "",          // 0x34
    "",          // 0x35
    "Dfree",     // 0x36
    "",          // 0x37
    "",          // 0x38
    "Dcreate",   // 0x39
    "Ddelete",   // 0x3A
    "Dsetpath",  // 0x3B
    "Fcreate",   // 0x3C
    "Fopen",     // 0x3D
    "Fclose",    // 0x3E
    "Fread",     // 0x3F
    "Fwrite",    // 0x40
    "Fdelete",   // 0x41
    "Fseek",     // 0x42
    "Fattrib",   // 0x43
    "Mxalloc",   // 0x44
    "Fdup",      // 0x45
    "Fforce",    // 0x46
    "Dgetpath",  // 0x47
    "Malloc",    // 0x48
    "Mfree",     // 0x49
    "Mshrink",   // 0x4A
    "Pexec",     // 0x4B
    "Pterm",     // 0x4C
    "",          // 0x4D
    "Fsfirst",   // 0x4E
    "Fsnext",    // 0x4F
    "",          // 0x50
    "",          // 0x51
    "",          // 0x52
    "",          // 0x53
    "",          // 0x54
    "",          // 0x55
    "Frename",   // 0x56
    "Fdatime",   // 0x57
    "",          // 0x58
    "",          // 0x59
    "",          // 0x5A
    "",          // 0x5B
    "Flock",     // 0x5C
];

/// Character-device calls the target fires constantly; their telemetry is
/// demoted to trace level to keep the log readable.
pub const CHATTY_CALLS: [u8; 15] = [
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x10, 0x11, 0x12, 0x13,
];

/// Printable name of a trap number, or a hex fallback for out-of-range or
/// unnamed calls.
pub fn call_name(call: u16) -> &'static str {
    GEMDOS_CALLS
        .get(call as usize)
        .copied()
        .filter(|n| !n.is_empty())
        .unwrap_or("?")
}

pub fn is_chatty(call: u16) -> bool {
    call <= u8::MAX as u16 && CHATTY_CALLS.contains(&(call as u8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_names() {
        assert_eq!(call_name(0x3D), "Fopen");
        assert_eq!(call_name(0x4E), "Fsfirst");
        assert_eq!(call_name(0x0C), "?");
        assert_eq!(call_name(0x200), "?");
    }

    #[test]
    fn console_calls_are_chatty() {
        assert!(is_chatty(0x09));
        assert!(!is_chatty(0x3D));
    }
}
