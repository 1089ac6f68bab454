/// The closed set of metadata subheader kinds, keyed by the sentinel
/// signature word at the start of each subheader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubheaderKind {
    RowSize,
    ColumnSize,
    SubheaderCounts,
    ColumnText,
    ColumnName,
    ColumnAttrs,
    ColumnFormatLabel,
    ColumnList,
}

/// Classifies a pointer-word signature.
///
/// 32-bit files read a 4-byte word (zero-extended here); 64-bit files read
/// 8 bytes, where the sentinel may sit in either half depending on byte
/// order, hence the doubled patterns.
#[must_use]
pub const fn classify(signature: u64) -> Option<SubheaderKind> {
    match signature {
        0xF7F7_F7F7
        | 0xFFFF_FFFF_F7F7_F7F7
        | 0xF7F7_F7F7_0000_0000
        | 0xF7F7_F7F7_FFFF_FBFE => Some(SubheaderKind::RowSize),
        0xF6F6_F6F6
        | 0xFFFF_FFFF_F6F6_F6F6
        | 0xF6F6_F6F6_0000_0000
        | 0xF6F6_F6F6_FFFF_FBFE => Some(SubheaderKind::ColumnSize),
        0xFFFF_FC00 | 0xFFFF_FFFF_FFFF_FC00 => Some(SubheaderKind::SubheaderCounts),
        0xFFFF_FBFE | 0xFFFF_FFFF_FFFF_FBFE => Some(SubheaderKind::ColumnFormatLabel),
        0xFFFF_FFFD | 0xFFFF_FFFF_FFFF_FFFD => Some(SubheaderKind::ColumnText),
        0xFFFF_FFFF | 0xFFFF_FFFF_FFFF_FFFF => Some(SubheaderKind::ColumnName),
        0xFFFF_FFFC | 0xFFFF_FFFF_FFFF_FFFC => Some(SubheaderKind::ColumnAttrs),
        0xFFFF_FFFE | 0xFFFF_FFFF_FFFF_FFFE => Some(SubheaderKind::ColumnList),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_signatures_classify() {
        assert_eq!(classify(0xF7F7_F7F7), Some(SubheaderKind::RowSize));
        assert_eq!(classify(0xF6F6_F6F6), Some(SubheaderKind::ColumnSize));
        assert_eq!(classify(0xFFFF_FC00), Some(SubheaderKind::SubheaderCounts));
        assert_eq!(classify(0xFFFF_FFFD), Some(SubheaderKind::ColumnText));
        assert_eq!(classify(0xFFFF_FFFF), Some(SubheaderKind::ColumnName));
        assert_eq!(classify(0xFFFF_FFFC), Some(SubheaderKind::ColumnAttrs));
        assert_eq!(classify(0xFFFF_FBFE), Some(SubheaderKind::ColumnFormatLabel));
        assert_eq!(classify(0xFFFF_FFFE), Some(SubheaderKind::ColumnList));
    }

    #[test]
    fn wide_signatures_classify_in_both_halves() {
        assert_eq!(
            classify(0xF7F7_F7F7_0000_0000),
            Some(SubheaderKind::RowSize)
        );
        assert_eq!(
            classify(0xFFFF_FFFF_F7F7_F7F7),
            Some(SubheaderKind::RowSize)
        );
        assert_eq!(
            classify(0xFFFF_FFFF_FFFF_FFFF),
            Some(SubheaderKind::ColumnName)
        );
        assert_eq!(
            classify(0xFFFF_FFFF_FFFF_FBFE),
            Some(SubheaderKind::ColumnFormatLabel)
        );
    }

    #[test]
    fn unknown_signatures_are_none() {
        assert_eq!(classify(0xDEAD_BEEF), None);
        assert_eq!(classify(0), None);
    }
}
