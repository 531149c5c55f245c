/// Numeric code shared by every contig outside chr1..22, X, Y and M.
pub const UNRECOGNIZED_CODE: u32 = 99;

const NUM_AUTOSOMES: u32 = 22;

/// Canonical sortable code of a reference sequence name.
///
/// Autosomes sort by number, followed by X, Y and M. Every other contig sorts
/// after them; ties among those are broken by name so the order stays total.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChromCode {
    Autosome(u32),
    X,
    Y,
    M,
    Other(String),
}

impl ChromCode {
    pub fn new(reference_name: &str) -> Self {
        let name = strip_chr_prefix(reference_name);
        match name {
            "X" | "x" => ChromCode::X,
            "Y" | "y" => ChromCode::Y,
            "M" | "m" | "MT" | "Mt" | "mt" => ChromCode::M,
            _ => match name.parse::<u32>() {
                Ok(n) if (1..=NUM_AUTOSOMES).contains(&n) && !name.starts_with('0') => {
                    ChromCode::Autosome(n)
                }
                _ => ChromCode::Other(reference_name.to_string()),
            },
        }
    }

    /// Integer form of the code, as used in sort keys.
    pub fn code(&self) -> u32 {
        match self {
            ChromCode::Autosome(n) => *n,
            ChromCode::X => NUM_AUTOSOMES + 1,
            ChromCode::Y => NUM_AUTOSOMES + 2,
            ChromCode::M => NUM_AUTOSOMES + 3,
            ChromCode::Other(_) => UNRECOGNIZED_CODE,
        }
    }
}

/// Integer code of a reference name. Never fails.
pub fn chrom_code(reference_name: &str) -> u32 {
    ChromCode::new(reference_name).code()
}

fn strip_chr_prefix(name: &str) -> &str {
    match name.get(..3) {
        Some(prefix) if name.len() > 3 && prefix.eq_ignore_ascii_case("chr") => &name[3..],
        _ => name,
    }
}
