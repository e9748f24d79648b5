//! Byte sizes and ulimits in the grammars understood by the image builder.

use std::fmt;
use std::str::FromStr;

use bakery_common::error::{BakeError, Result};
use nom::{
    IResult, Parser,
    character::complete::{char, digit1, one_of},
    combinator::{all_consuming, opt, recognize},
    multi::many0,
};

const KIB: f64 = 1024.0;

const BINARY_ABBRS: [&str; 9] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];

const ULIMIT_NAMES: [&str; 15] = [
    "core",
    "cpu",
    "data",
    "fsize",
    "locks",
    "memlock",
    "msgqueue",
    "nice",
    "nofile",
    "nproc",
    "rss",
    "rtprio",
    "rttime",
    "sigpending",
    "stack",
];

/// Splits `<number>[ ][kmgtp][i][b]` into its number and unit prefix.
fn size_literal(input: &str) -> IResult<&str, (&str, Option<char>)> {
    all_consuming((
        recognize((digit1, many0((char('.'), digit1)))),
        opt(char(' ')),
        opt(one_of("kKmMgGtTpP")),
        opt(one_of("iI")),
        opt(one_of("bB")),
    ))
    .map(|(number, _, unit, _, _)| (number, unit))
    .parse(input)
}

/// Parses a human-readable memory size with binary multipliers (`2g`, `512MiB`, `1.5gb`).
///
/// # Errors
///
/// Returns [`BakeError::InvalidSize`] if the input does not follow the size grammar.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn parse_ram_in_bytes(input: &str) -> Result<i64> {
    let invalid = || BakeError::InvalidSize {
        value: input.to_owned(),
    };
    let (_, (number, unit)) = size_literal(input).map_err(|_| invalid())?;
    let size: f64 = number.parse().map_err(|_| invalid())?;
    let multiplier = match unit.map(|u| u.to_ascii_lowercase()) {
        None => 1.0,
        Some('k') => KIB,
        Some('m') => KIB.powi(2),
        Some('g') => KIB.powi(3),
        Some('t') => KIB.powi(4),
        Some(_) => KIB.powi(5),
    };
    Ok((size * multiplier) as i64)
}

/// Formats a byte count with binary units and four significant digits (`256MiB`, `1.5GiB`).
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_mem_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return format!("0{}", BINARY_ABBRS[0]);
    }
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= KIB && unit < BINARY_ABBRS.len() - 1 {
        size /= KIB;
        unit += 1;
    }
    format!("{}{}", significant(size, 4), BINARY_ABBRS[unit])
}

/// Renders `value` (at least 1) with `digits` significant digits, dropping trailing zeros.
#[allow(clippy::cast_possible_truncation)]
fn significant(value: f64, digits: i32) -> String {
    let integral = value.log10().floor() as i32 + 1;
    let precision = usize::try_from(digits - integral).unwrap_or(0);
    let text = format!("{value:.precision$}");
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_owned()
    } else {
        text
    }
}

/// A resource limit as passed to the builder: `name=soft:hard`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ulimit {
    /// Resource name, e.g. `nofile`.
    pub name: String,
    /// Soft limit.
    pub soft: i64,
    /// Hard limit; `-1` means unlimited.
    pub hard: i64,
}

impl FromStr for Ulimit {
    type Err = BakeError;

    /// Parses `name=soft[:hard]`. A missing hard limit equals the soft limit.
    fn from_str(value: &str) -> Result<Self> {
        let invalid = |message: String| BakeError::InvalidUlimit {
            value: value.to_owned(),
            message,
        };

        let (name, limits) = value
            .split_once('=')
            .ok_or_else(|| invalid(format!("invalid ulimit argument: {value}")))?;
        if !ULIMIT_NAMES.contains(&name) {
            return Err(invalid(format!("invalid ulimit type: {name}")));
        }

        let parse = |s: &str| {
            s.parse::<i64>()
                .map_err(|e| invalid(format!("invalid limit \"{s}\": {e}")))
        };
        let (soft, hard) = match limits.split_once(':') {
            Some((soft, hard)) => (parse(soft)?, parse(hard)?),
            None => {
                let soft = parse(limits)?;
                (soft, soft)
            }
        };
        if hard != -1 && soft > hard {
            return Err(invalid(format!(
                "ulimit soft limit must be less than or equal to hard limit: {soft} > {hard}"
            )));
        }

        Ok(Self {
            name: name.to_owned(),
            soft,
            hard,
        })
    }
}

impl fmt::Display for Ulimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}:{}", self.name, self.soft, self.hard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_mem_bytes_whole_units() {
        assert_eq!(format_mem_bytes(268_435_456), "256MiB");
        assert_eq!(format_mem_bytes(2_147_483_648), "2GiB");
        assert_eq!(format_mem_bytes(1024), "1KiB");
    }

    #[test]
    fn format_mem_bytes_fractions() {
        assert_eq!(format_mem_bytes(1_610_612_736), "1.5GiB");
        assert_eq!(format_mem_bytes(1_126_400), "1.074MiB");
    }

    #[test]
    fn format_mem_bytes_small_values() {
        assert_eq!(format_mem_bytes(0), "0B");
        assert_eq!(format_mem_bytes(1000), "1000B");
    }

    #[test]
    fn parse_ram_plain_bytes() {
        assert_eq!(parse_ram_in_bytes("512").expect("parse"), 512);
    }

    #[test]
    fn parse_ram_units() {
        assert_eq!(parse_ram_in_bytes("2g").expect("parse"), 2_147_483_648);
        assert_eq!(parse_ram_in_bytes("256MiB").expect("parse"), 268_435_456);
        assert_eq!(parse_ram_in_bytes("64 kb").expect("parse"), 65_536);
        assert_eq!(parse_ram_in_bytes("1.5GB").expect("parse"), 1_610_612_736);
    }

    #[test]
    fn parse_ram_rejects_garbage() {
        for input in ["", "g", "12x", "1.2.3m", "-5m", "5 m b i"] {
            assert!(parse_ram_in_bytes(input).is_err(), "{input}");
        }
    }

    #[test]
    fn ulimit_round_trips() {
        let ulimit: Ulimit = "nofile=1024:2048".parse().expect("parse");
        assert_eq!(ulimit.soft, 1024);
        assert_eq!(ulimit.hard, 2048);
        assert_eq!(ulimit.to_string(), "nofile=1024:2048");
    }

    #[test]
    fn ulimit_single_value_sets_both() {
        let ulimit: Ulimit = "nproc=65535".parse().expect("parse");
        assert_eq!(ulimit.to_string(), "nproc=65535:65535");
    }

    #[test]
    fn ulimit_unlimited_hard() {
        let ulimit: Ulimit = "memlock=100:-1".parse().expect("parse");
        assert_eq!(ulimit.hard, -1);
    }

    #[test]
    fn ulimit_rejects_unknown_name() {
        let err = "bogus=1:2".parse::<Ulimit>().unwrap_err();
        assert!(err.to_string().contains("invalid ulimit type"), "got: {err}");
    }

    #[test]
    fn ulimit_rejects_soft_above_hard() {
        let err = "nofile=20:10".parse::<Ulimit>().unwrap_err();
        assert!(err.to_string().contains("20 > 10"), "got: {err}");
    }

    #[test]
    fn ulimit_rejects_missing_equals() {
        assert!("nofile".parse::<Ulimit>().is_err());
        assert!("nofile=a:b".parse::<Ulimit>().is_err());
    }
}
