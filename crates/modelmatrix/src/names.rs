//! Column name cleaning.

/// Rewrite a column name as lowercase snake case.
///
/// Every run of characters that are not letters or digits becomes a single
/// `_`, leading and trailing underscores are dropped, and letters are
/// lowercased. A name with no letters or digits becomes `column`.
///
/// ```
/// use modelmatrix::make_clean_names;
///
/// assert_eq!(make_clean_names("x1:x2"), "x1_x2");
/// assert_eq!(make_clean_names("I(x ** 2)"), "i_x_2");
/// assert_eq!(make_clean_names("Intercept"), "intercept");
/// ```
pub fn make_clean_names(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;

    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }

    if out.is_empty() {
        out.push_str("column");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn operators_become_single_underscores() {
        assert_eq!(make_clean_names("a:b:c"), "a_b_c");
        assert_eq!(make_clean_names("log(x2)"), "log_x2");
        assert_eq!(make_clean_names("I((a + b) * 2)"), "i_a_b_2");
        assert_eq!(make_clean_names("poly_x_2"), "poly_x_2");
    }

    #[test]
    fn case_and_spacing() {
        assert_eq!(make_clean_names("My Column"), "my_column");
        assert_eq!(make_clean_names("  __Price__ "), "price");
        assert_eq!(make_clean_names("Größe"), "größe");
    }

    #[test]
    fn nothing_left_gives_placeholder() {
        assert_eq!(make_clean_names("@#$%"), "column");
        assert_eq!(make_clean_names(""), "column");
    }
}
