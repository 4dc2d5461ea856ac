//! Header normalization.
//!
//! Spreadsheet column headers arrive free-form ("Issued Qty (Ass)", "BAL. TO
//! ISSUE", "areaLineSheetIdent"). Every header is reduced to a stable
//! snake_case token that doubles as the field name inside a project's row
//! store, so the same function also maps user-supplied filter and selection
//! parameters back onto derived fields.

/// Normalize a free-form header into a snake_case field token.
///
/// Pure and total: never panics, accepts any printable input. Idempotent, so
/// already-normalized tokens pass through unchanged. Input consisting only of
/// punctuation yields an empty string; call sites reject empty tokens with a
/// validation error instead of silently dropping the column.
pub fn normalize_header(header: &str) -> String {
    let chars: Vec<char> = header.chars().collect();
    let mut out = String::with_capacity(header.len());

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }

        let boundary = i > 0 && {
            let prev = chars[i - 1];
            (prev.is_lowercase() && c.is_uppercase())
                || (prev.is_alphabetic() && c.is_numeric())
                || (prev.is_numeric() && c.is_alphabetic())
                || (prev.is_uppercase()
                    && c.is_uppercase()
                    && chars.get(i + 1).map_or(false, |n| n.is_lowercase()))
        };

        if boundary && !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
        // lowercasing can expand into combining marks; keep only the
        // alphanumeric part so the result survives a second pass unchanged
        for lc in c.to_lowercase().filter(|lc| lc.is_alphanumeric()) {
            out.push(lc);
        }
    }

    while out.ends_with('_') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_spaces_and_case() {
        assert_eq!(normalize_header("Issued Qty"), "issued_qty");
        assert_eq!(normalize_header("CONSUMED QTY"), "consumed_qty");
        assert_eq!(normalize_header("Bal. To Issue"), "bal_to_issue");
    }

    #[test]
    fn test_camel_case_boundaries() {
        assert_eq!(normalize_header("areaLineSheetIdent"), "area_line_sheet_ident");
        assert_eq!(normalize_header("issuedQtyAss"), "issued_qty_ass");
        assert_eq!(normalize_header("ABCd"), "ab_cd");
    }

    #[test]
    fn test_digit_boundaries() {
        assert_eq!(normalize_header("Size2"), "size_2");
        assert_eq!(normalize_header("2nd Size"), "2_nd_size");
    }

    #[test]
    fn test_degenerate_input() {
        assert_eq!(normalize_header(""), "");
        assert_eq!(normalize_header("---"), "");
        assert_eq!(normalize_header("  __  "), "");
    }

    #[test]
    fn test_already_normalized() {
        assert_eq!(normalize_header("issued_qty"), "issued_qty");
        assert_eq!(normalize_header("balance_to_issue"), "balance_to_issue");
    }

    proptest! {
        /// normalize(normalize(s)) == normalize(s) for any input.
        #[test]
        fn prop_normalization_idempotent(s in "\\PC{0,64}") {
            let once = normalize_header(&s);
            let twice = normalize_header(&once);
            prop_assert_eq!(once, twice);
        }

        /// Output is always lowercase snake_case with no edge underscores.
        #[test]
        fn prop_output_shape(s in "\\PC{0,64}") {
            let token = normalize_header(&s);
            prop_assert!(token.chars().all(|c| c == '_' || (c.is_alphanumeric() && !c.is_uppercase())));
            prop_assert!(!token.starts_with('_'));
            prop_assert!(!token.ends_with('_'));
        }
    }
}
