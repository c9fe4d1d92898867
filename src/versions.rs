use cached::proc_macro::cached;
use lazy_static::lazy_static;
use log::debug;
use pubgrub::range::Range;
use pubgrub::version::SemanticVersion;
use regex::Regex;
use thiserror::Error;

lazy_static! {
    // Release segment is captured; pre/post/dev/local suffixes compare as the release.
    static ref VERSION_RE: Regex = Regex::new(
        r"(?i)^v?(?:0!)?(\d+(?:\.\d+)*)(?:[._-]?(?:a|b|c|rc|alpha|beta|pre|preview)[._-]?\d*)?(?:[._-]?(?:post|rev|r)[._-]?\d*|-\d+)?(?:[._-]?dev[._-]?\d*)?(?:\+[a-z0-9]+(?:[._-][a-z0-9]+)*)?$"
    )
    .expect("version pattern is valid");
    static ref WILDCARD_RE: Regex =
        Regex::new(r"^v?(?:0!)?(\d+(?:\.\d+)*)\.\*$").expect("wildcard pattern is valid");
}

/// Reasons a version specifier set cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionSpecError {
    #[error("missing comparison operator in `{0}`")]
    MissingOperator(String),
    #[error("invalid version `{0}`")]
    InvalidVersion(String),
    #[error("wildcard version `{0}` is only allowed with == and !=")]
    UnexpectedWildcard(String),
    #[error("`~=` needs at least two release components, got `{0}`")]
    CompatibleReleaseTooShort(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Arbitrary,
    Compatible,
    Equal,
    NotEqual,
    LessEqual,
    GreaterEqual,
    Less,
    Greater,
}

// Longest tokens first so that "<=" is not read as "<".
const OPERATORS: [(&str, Operator); 8] = [
    ("===", Operator::Arbitrary),
    ("~=", Operator::Compatible),
    ("==", Operator::Equal),
    ("!=", Operator::NotEqual),
    ("<=", Operator::LessEqual),
    (">=", Operator::GreaterEqual),
    ("<", Operator::Less),
    (">", Operator::Greater),
];

/// A parsed version operand: release components and whether it ended in `.*`
struct Operand {
    release: Vec<u32>,
    wildcard: bool,
}

fn parse_release(digits: &str, original: &str) -> Result<Vec<u32>, VersionSpecError> {
    digits
        .split('.')
        .map(|part| match part.parse::<u32>() {
            Ok(n) if n < u32::MAX => Ok(n),
            _ => Err(VersionSpecError::InvalidVersion(original.to_string())),
        })
        .collect()
}

fn parse_operand(version: &str) -> Result<Operand, VersionSpecError> {
    if let Some(caps) = WILDCARD_RE.captures(version) {
        return Ok(Operand {
            release: parse_release(&caps[1], version)?,
            wildcard: true,
        });
    }
    let caps = VERSION_RE
        .captures(version)
        .ok_or_else(|| VersionSpecError::InvalidVersion(version.to_string()))?;
    Ok(Operand {
        release: parse_release(&caps[1], version)?,
        wildcard: false,
    })
}

/// Maps release components onto a three-component version (padded or truncated)
fn release_version(release: &[u32]) -> SemanticVersion {
    let component = |i: usize| release.get(i).copied().unwrap_or(0);
    SemanticVersion::new(component(0), component(1), component(2))
}

/// First version after every version starting with `prefix`
fn prefix_upper(prefix: &[u32]) -> SemanticVersion {
    let base = release_version(prefix);
    match prefix.len() {
        0 | 1 => base.bump_major(),
        2 => base.bump_minor(),
        _ => base.bump_patch(),
    }
}

/// Parses one version string (e.g. "3.8", "2.0rc1") into a comparable version
pub fn parse_version(version: &str) -> Result<SemanticVersion, VersionSpecError> {
    let operand = parse_operand(version.trim())?;
    if operand.wildcard {
        return Err(VersionSpecError::UnexpectedWildcard(version.to_string()));
    }
    Ok(release_version(&operand.release))
}

fn parse_clause(clause: &str) -> Result<Range<SemanticVersion>, VersionSpecError> {
    let (op, rest) = OPERATORS
        .iter()
        .find_map(|(token, op)| clause.strip_prefix(token).map(|rest| (*op, rest.trim())))
        .ok_or_else(|| VersionSpecError::MissingOperator(clause.to_string()))?;
    let operand = parse_operand(rest)?;
    let version = release_version(&operand.release);

    if operand.wildcard {
        let prefix = Range::between(version, prefix_upper(&operand.release));
        return match op {
            Operator::Equal => Ok(prefix),
            Operator::NotEqual => Ok(prefix.negate()),
            _ => Err(VersionSpecError::UnexpectedWildcard(clause.to_string())),
        };
    }

    let range = match op {
        Operator::Arbitrary | Operator::Equal => Range::exact(version),
        Operator::NotEqual => Range::exact(version).negate(),
        Operator::Less => Range::strictly_lower_than(version),
        Operator::LessEqual => Range::strictly_lower_than(version.bump_patch()),
        Operator::Greater => Range::higher_than(version.bump_patch()),
        Operator::GreaterEqual => Range::higher_than(version),
        Operator::Compatible => {
            if operand.release.len() < 2 {
                return Err(VersionSpecError::CompatibleReleaseTooShort(clause.to_string()));
            }
            let prefix = &operand.release[..operand.release.len() - 1];
            Range::between(version, prefix_upper(prefix))
        }
    };
    Ok(range)
}

/// Parses a comma-separated specifier set (e.g. ">=3.6, !=3.0.*") into the
/// range of versions it admits. Empty clauses are ignored, so an empty set
/// admits every version.
///
/// Versions keep only three release components, so `!=3.8.0.1` excludes every 3.8.0.x.
pub fn parse_specifier_set(specifiers: &str) -> Result<Range<SemanticVersion>, VersionSpecError> {
    specifiers
        .split(',')
        .map(str::trim)
        .filter(|clause| !clause.is_empty())
        .try_fold(Range::any(), |acc, clause| -> Result<_, VersionSpecError> {
            Ok(acc.intersection(&parse_clause(clause)?))
        })
}

#[cached(
    size = 4096,
    key = "String",
    convert = r#"{ specifiers.trim().to_string() }"#,
    result = true
)]
fn parse_specifier_set_cached(
    specifiers: &str,
) -> Result<Range<SemanticVersion>, VersionSpecError> {
    parse_specifier_set(specifiers)
}

/// Decides whether some version satisfies both requirements.
///
/// A missing or empty requirement never blocks. Parse failures are returned
/// so that the caller can report them.
pub fn check_compatibility(
    req_a: Option<&str>,
    req_b: Option<&str>,
) -> Result<bool, VersionSpecError> {
    let constrained = |r: &&str| !r.trim().is_empty();
    let (Some(a), Some(b)) = (req_a.filter(constrained), req_b.filter(constrained)) else {
        return Ok(true);
    };
    let range_a = parse_specifier_set_cached(a)?;
    let range_b = parse_specifier_set_cached(b)?;
    let compatible = range_a.intersection(&range_b) != Range::none();
    debug!("Version requirements {} and {} compatible: {}", a, b, compatible);
    Ok(compatible)
}

/// Like [`check_compatibility`], treating unparsable requirements as incompatible
pub fn compatible(req_a: Option<&str>, req_b: Option<&str>) -> bool {
    check_compatibility(req_a, req_b).unwrap_or(false)
}
