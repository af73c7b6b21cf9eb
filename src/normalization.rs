/// Normalizes a devicename by stripping any surrounding whitespace and
/// composing it into Unicode Normalization Form C, so that the same
/// name typed on two devices is stored the same way.
///
/// ```
/// use collector::normalization::normalize_devicename;
/// assert_eq!(normalize_devicename(" hi\u{0308} "), "h\u{00ef}");
/// ```
pub fn normalize_devicename(name: impl AsRef<str>) -> String {
    use unicode_normalization::UnicodeNormalization;

    name.as_ref().trim().nfc().to_string()
}
