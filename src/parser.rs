// Plain comma splitting. Quoted fields are not supported, a comma inside a
// value always starts a new cell.

pub type Row = Vec<String>;

const BOM: char = '\u{FEFF}';

/// Splits raw csv text into rows of cells.
///
/// A leading byte order mark and surrounding whitespace are removed, lines may
/// end in `\n` or `\r\n`, and rows without any non-empty cell are dropped.
pub fn parse_csv(text: &str) -> Vec<Row> {
    let cleaned = text.strip_prefix(BOM).unwrap_or(text).trim();
    if cleaned.is_empty() {
        return Vec::new();
    }

    cleaned
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .map(|line| line.split(',').map(str::to_string).collect::<Row>())
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .collect()
}

/// Inverse of [`parse_csv`] for rows without embedded commas.
pub fn to_csv(rows: &[Row]) -> String {
    rows.iter()
        .map(|row| row.join(","))
        .collect::<Vec<String>>()
        .join("\n")
}
