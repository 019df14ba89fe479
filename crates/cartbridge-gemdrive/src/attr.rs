use cartbridge_storage::FileAttributes;

bitflags::bitflags! {
    /// Attribute bits as the target's file system defines them.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TosAttributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const VOLUME_LABEL = 0x08;
        const FOLDER = 0x10;
        const ARCHIVE = 0x20;
    }
}

/// Attribute bits Fattrib-set and Fcreate are allowed to change.
pub const SETTABLE: FileAttributes = FileAttributes::READ_ONLY
    .union(FileAttributes::HIDDEN)
    .union(FileAttributes::SYSTEM);

/// Storage attributes to target attributes. The bit positions coincide, so
/// the translation is a mask; unmapped bits fall away.
pub fn to_tos(attrs: FileAttributes) -> TosAttributes {
    TosAttributes::from_bits_truncate(attrs.bits())
}

/// Target attributes to storage attributes, bit by named bit.
pub fn to_fs(attrs: TosAttributes) -> FileAttributes {
    let mut out = FileAttributes::empty();
    if attrs.contains(TosAttributes::READ_ONLY) {
        out |= FileAttributes::READ_ONLY;
    }
    if attrs.contains(TosAttributes::HIDDEN) {
        out |= FileAttributes::HIDDEN;
    }
    if attrs.contains(TosAttributes::SYSTEM) {
        out |= FileAttributes::SYSTEM;
    }
    if attrs.contains(TosAttributes::VOLUME_LABEL) {
        out |= FileAttributes::VOLUME_LABEL;
    }
    if attrs.contains(TosAttributes::FOLDER) {
        out |= FileAttributes::DIRECTORY;
    }
    if attrs.contains(TosAttributes::ARCHIVE) {
        out |= FileAttributes::ARCHIVE;
    }
    out
}

/// Six-position display string, `R H S L D A` with dashes for clear bits.
pub fn display(attrs: TosAttributes) -> String {
    let mut out = *b"------";
    for (pos, (flag, letter)) in [
        (TosAttributes::READ_ONLY, b'R'),
        (TosAttributes::HIDDEN, b'H'),
        (TosAttributes::SYSTEM, b'S'),
        (TosAttributes::VOLUME_LABEL, b'L'),
        (TosAttributes::FOLDER, b'D'),
        (TosAttributes::ARCHIVE, b'A'),
    ]
    .into_iter()
    .enumerate()
    {
        if attrs.contains(flag) {
            out[pos] = letter;
        }
    }
    String::from_utf8(out.to_vec()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_is_a_bijection_on_the_common_bits() {
        for bits in 0u8..=0x3F {
            let tos = TosAttributes::from_bits_truncate(bits);
            assert_eq!(to_tos(to_fs(tos)), tos);
        }
        for bits in 0u8..=0x3F {
            let fs = FileAttributes::from_bits_truncate(bits);
            assert_eq!(to_fs(to_tos(fs)), fs);
        }
    }

    #[test]
    fn display_marks_set_bits() {
        assert_eq!(display(TosAttributes::empty()), "------");
        assert_eq!(
            display(TosAttributes::READ_ONLY | TosAttributes::FOLDER),
            "R---D-"
        );
        assert_eq!(display(TosAttributes::all()), "RHSLDA");
    }
}
