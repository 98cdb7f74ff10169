//! unrar exit status table

/// Exit statuses documented by unrar, with their explanation
const EXIT_CODES: &[(i32, &str)] = &[
    (0, "Success"),
    (1, "Warning"),
    (2, "Fatal"),
    (3, "CRC mismatch"),
    (4, "Lock"),
    (5, "Write"),
    (6, "Open"),
    (7, "User error"),
    (8, "Memory"),
    (9, "Create"),
    (10, "No files to extract"),
    (11, "Bad password"),
    (255, "User break"),
];

/// Explain an unrar exit status, or `None` if the status is not documented
pub fn explain_exit_code(code: i32) -> Option<&'static str> {
    EXIT_CODES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, explanation)| *explanation)
}
