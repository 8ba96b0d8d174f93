#![forbid(unsafe_code)]

//! Built-in simple types and facet checking.

use std::borrow::Cow;
use std::cmp::Ordering;

use base64::Engine;

use super::model::Facets;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WhiteSpace {
    Preserve,
    Replace,
    Collapse,
}

impl WhiteSpace {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "preserve" => Some(Self::Preserve),
            "replace" => Some(Self::Replace),
            "collapse" => Some(Self::Collapse),
            _ => None,
        }
    }

    pub fn apply<'a>(&self, value: &'a str) -> Cow<'a, str> {
        let is_ws = |c: char| matches!(c, ' ' | '\t' | '\r' | '\n');
        match self {
            WhiteSpace::Preserve => Cow::Borrowed(value),
            WhiteSpace::Replace if !value.contains(['\t', '\r', '\n']) => Cow::Borrowed(value),
            WhiteSpace::Replace => Cow::Owned(value.replace(['\t', '\r', '\n'], " ")),
            WhiteSpace::Collapse => {
                let collapsed = value.split(is_ws).filter(|s| !s.is_empty()).collect::<Vec<_>>();
                if collapsed.len() == 1 && collapsed[0].len() == value.len() {
                    Cow::Borrowed(value)
                } else {
                    Cow::Owned(collapsed.join(" "))
                }
            }
        }
    }
}

macro_rules! builtins {
    ($($variant:ident = $name:literal : $base:expr;)+) => {
        /// The built-in simple types of XML Schema 1.0.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Builtin {
            $($variant),+
        }

        impl Builtin {
            pub const ALL: &'static [Builtin] = &[$(Builtin::$variant),+];

            /// Local name in the XML Schema namespace.
            pub fn name(self) -> &'static str {
                match self {
                    $(Builtin::$variant => $name),+
                }
            }

            /// The type this one restricts.
            pub fn base(self) -> Option<Builtin> {
                match self {
                    $(Builtin::$variant => $base),+
                }
            }
        }
    };
}

builtins! {
    AnySimpleType = "anySimpleType": None;
    String = "string": Some(Builtin::AnySimpleType);
    NormalizedString = "normalizedString": Some(Builtin::String);
    Token = "token": Some(Builtin::NormalizedString);
    Language = "language": Some(Builtin::Token);
    NmToken = "NMTOKEN": Some(Builtin::Token);
    NmTokens = "NMTOKENS": Some(Builtin::AnySimpleType);
    Name = "Name": Some(Builtin::Token);
    NcName = "NCName": Some(Builtin::Name);
    Id = "ID": Some(Builtin::NcName);
    IdRef = "IDREF": Some(Builtin::NcName);
    IdRefs = "IDREFS": Some(Builtin::AnySimpleType);
    Entity = "ENTITY": Some(Builtin::NcName);
    Entities = "ENTITIES": Some(Builtin::AnySimpleType);
    Boolean = "boolean": Some(Builtin::AnySimpleType);
    Decimal = "decimal": Some(Builtin::AnySimpleType);
    Integer = "integer": Some(Builtin::Decimal);
    NonPositiveInteger = "nonPositiveInteger": Some(Builtin::Integer);
    NegativeInteger = "negativeInteger": Some(Builtin::NonPositiveInteger);
    Long = "long": Some(Builtin::Integer);
    Int = "int": Some(Builtin::Long);
    Short = "short": Some(Builtin::Int);
    Byte = "byte": Some(Builtin::Short);
    NonNegativeInteger = "nonNegativeInteger": Some(Builtin::Integer);
    UnsignedLong = "unsignedLong": Some(Builtin::NonNegativeInteger);
    UnsignedInt = "unsignedInt": Some(Builtin::UnsignedLong);
    UnsignedShort = "unsignedShort": Some(Builtin::UnsignedInt);
    UnsignedByte = "unsignedByte": Some(Builtin::UnsignedShort);
    PositiveInteger = "positiveInteger": Some(Builtin::NonNegativeInteger);
    Float = "float": Some(Builtin::AnySimpleType);
    Double = "double": Some(Builtin::AnySimpleType);
    Duration = "duration": Some(Builtin::AnySimpleType);
    DateTime = "dateTime": Some(Builtin::AnySimpleType);
    Time = "time": Some(Builtin::AnySimpleType);
    Date = "date": Some(Builtin::AnySimpleType);
    GYearMonth = "gYearMonth": Some(Builtin::AnySimpleType);
    GYear = "gYear": Some(Builtin::AnySimpleType);
    GMonthDay = "gMonthDay": Some(Builtin::AnySimpleType);
    GDay = "gDay": Some(Builtin::AnySimpleType);
    GMonth = "gMonth": Some(Builtin::AnySimpleType);
    HexBinary = "hexBinary": Some(Builtin::AnySimpleType);
    Base64Binary = "base64Binary": Some(Builtin::AnySimpleType);
    AnyUri = "anyURI": Some(Builtin::AnySimpleType);
    QName = "QName": Some(Builtin::AnySimpleType);
    Notation = "NOTATION": Some(Builtin::AnySimpleType);
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| b.name() == name)
    }

    pub fn white_space(self) -> WhiteSpace {
        match self {
            Builtin::AnySimpleType | Builtin::String => WhiteSpace::Preserve,
            Builtin::NormalizedString => WhiteSpace::Replace,
            _ => WhiteSpace::Collapse,
        }
    }

    /// Whether `self` is `other` or restricts it, directly or not.
    pub fn derives_from(self, other: Builtin) -> bool {
        let mut current = Some(self);
        while let Some(b) = current {
            if b == other {
                return true;
            }
            current = b.base();
        }
        false
    }

    pub fn is_list(self) -> bool {
        matches!(self, Builtin::NmTokens | Builtin::IdRefs | Builtin::Entities)
    }

    pub fn is_numeric(self) -> bool {
        self.derives_from(Builtin::Decimal) || matches!(self, Builtin::Float | Builtin::Double)
    }

    /// Integer bounds of the integer-derived types.
    fn integer_range(self) -> (Option<i128>, Option<i128>) {
        match self {
            Builtin::NonPositiveInteger => (None, Some(0)),
            Builtin::NegativeInteger => (None, Some(-1)),
            Builtin::Long => (Some(i64::MIN.into()), Some(i64::MAX.into())),
            Builtin::Int => (Some(i32::MIN.into()), Some(i32::MAX.into())),
            Builtin::Short => (Some(i16::MIN.into()), Some(i16::MAX.into())),
            Builtin::Byte => (Some(i8::MIN.into()), Some(i8::MAX.into())),
            Builtin::NonNegativeInteger => (Some(0), None),
            Builtin::UnsignedLong => (Some(0), Some(u64::MAX.into())),
            Builtin::UnsignedInt => (Some(0), Some(u32::MAX.into())),
            Builtin::UnsignedShort => (Some(0), Some(u16::MAX.into())),
            Builtin::UnsignedByte => (Some(0), Some(u8::MAX.into())),
            Builtin::PositiveInteger => (Some(1), None),
            _ => (None, None),
        }
    }

    /// Check a whitespace-normalized lexical value.
    ///
    /// `prefix_bound` reports whether a QName prefix is in scope.
    pub fn validate(
        self,
        value: &str,
        prefix_bound: &dyn Fn(&str) -> bool,
    ) -> Result<(), String> {
        let ok = match self {
            Builtin::AnySimpleType | Builtin::String | Builtin::NormalizedString => true,
            Builtin::Token => !value.starts_with(' ') && !value.ends_with(' ') && !value.contains("  "),
            Builtin::Language => is_language(value),
            Builtin::NmToken => is_nmtoken(value),
            Builtin::Name => is_name(value),
            Builtin::NcName | Builtin::Id | Builtin::IdRef | Builtin::Entity => is_ncname(value),
            Builtin::NmTokens => !value.is_empty() && value.split(' ').all(is_nmtoken),
            Builtin::IdRefs | Builtin::Entities => {
                !value.is_empty() && value.split(' ').all(is_ncname)
            }
            Builtin::Boolean => matches!(value, "true" | "false" | "1" | "0"),
            Builtin::Decimal => parse_decimal(value).is_some(),
            Builtin::Float | Builtin::Double => is_float(value),
            Builtin::Duration => is_duration(value),
            Builtin::DateTime => date_time::date_time(value),
            Builtin::Time => date_time::time(value),
            Builtin::Date => date_time::date(value),
            Builtin::GYearMonth => date_time::g_year_month(value),
            Builtin::GYear => date_time::g_year(value),
            Builtin::GMonthDay => date_time::g_month_day(value),
            Builtin::GDay => date_time::g_day(value),
            Builtin::GMonth => date_time::g_month(value),
            Builtin::HexBinary => hex::decode(value).is_ok(),
            Builtin::Base64Binary => decode_base64(value).is_some(),
            Builtin::AnyUri => !value.chars().any(char::is_control),
            Builtin::QName | Builtin::Notation => match value.split_once(':') {
                Some((prefix, local)) => {
                    if !(is_ncname(prefix) && is_ncname(local)) {
                        false
                    } else if !prefix_bound(prefix) {
                        return Err(format!("QName prefix '{prefix}' is not bound in '{value}'"));
                    } else {
                        true
                    }
                }
                None => is_ncname(value),
            },
            integer => {
                let Some(decimal) = parse_decimal(value) else {
                    return Err(format!("'{value}' is not a valid value for '{}'", integer.name()));
                };
                if !decimal.fraction.is_empty() || value.contains('.') {
                    false
                } else {
                    let (min, max) = integer.integer_range();
                    in_range(&decimal, min, max)
                }
            }
        };
        if ok {
            Ok(())
        } else {
            Err(format!("'{value}' is not a valid value for '{}'", self.name()))
        }
    }

    /// Length as measured by the length facets.
    pub fn length_of(self, value: &str) -> usize {
        match self {
            Builtin::HexBinary => value.len() / 2,
            Builtin::Base64Binary => decode_base64(value).map(|d| d.len()).unwrap_or(0),
            b if b.is_list() => value.split_whitespace().count(),
            _ => value.chars().count(),
        }
    }
}

fn decode_base64(value: &str) -> Option<Vec<u8>> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .ok()
}

fn is_name_start(c: char) -> bool {
    c == '_' || c == ':' || c.is_alphabetic()
}

fn is_name_char(c: char) -> bool {
    is_name_start(c)
        || c.is_numeric()
        || matches!(c, '-' | '.' | '\u{B7}' | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

pub fn is_name(value: &str) -> bool {
    let mut chars = value.chars();
    chars.next().is_some_and(is_name_start) && chars.all(is_name_char)
}

pub fn is_ncname(value: &str) -> bool {
    !value.contains(':') && is_name(value)
}

pub fn is_nmtoken(value: &str) -> bool {
    !value.is_empty() && value.chars().all(is_name_char)
}

fn is_language(value: &str) -> bool {
    let mut parts = value.split('-');
    let primary_ok = parts
        .next()
        .is_some_and(|p| (1..=8).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphabetic()));
    primary_ok && parts.all(|p| (1..=8).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphanumeric()))
}

fn is_float(value: &str) -> bool {
    if matches!(value, "INF" | "-INF" | "NaN") {
        return true;
    }
    // Rust also accepts spellings such as "inf" that are not lexical floats.
    let allowed = |c: char| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E');
    !value.is_empty() && value.chars().all(allowed) && value.parse::<f64>().is_ok()
}

fn is_duration(value: &str) -> bool {
    let body = value.strip_prefix('-').unwrap_or(value);
    let Some(body) = body.strip_prefix('P') else {
        return false;
    };
    let (date, time) = match body.split_once('T') {
        Some((date, time)) => {
            if time.is_empty() {
                return false;
            }
            (date, Some(time))
        }
        None => (body, None),
    };
    let mut seen_any = false;
    let mut check = |part: &str, designators: &[char], fractional_last: bool| -> bool {
        let mut rest = part;
        let mut allowed = designators;
        while !rest.is_empty() {
            let Some(end) = rest.find(|c: char| !c.is_ascii_digit() && c != '.') else {
                return false;
            };
            let number = &rest[..end];
            let Some(designator) = rest[end..].chars().next() else {
                return false;
            };
            let Some(index) = allowed.iter().position(|d| *d == designator) else {
                return false;
            };
            let fractional_ok = fractional_last && designator == 'S';
            let number_ok = if number.contains('.') {
                fractional_ok && parse_decimal(number).is_some() && !number.ends_with('.')
            } else {
                !number.is_empty()
            };
            if !number_ok {
                return false;
            }
            seen_any = true;
            allowed = &allowed[index + 1..];
            rest = &rest[end + designator.len_utf8()..];
        }
        true
    };
    let date_ok = check(date, &['Y', 'M', 'D'], false);
    let time_ok = time.map_or(true, |t| check(t, &['H', 'M', 'S'], true));
    date_ok && time_ok && seen_any
}

/// A decimal split into sign and significant digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decimal {
    pub negative: bool,
    /// Integer digits without leading zeros; empty for zero.
    pub integer: String,
    /// Fraction digits without trailing zeros.
    pub fraction: String,
}

pub fn parse_decimal(value: &str) -> Option<Decimal> {
    let (negative, unsigned) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };
    let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if integer.is_empty() && fraction.is_empty() {
        return None;
    }
    let digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !digits(integer) || !digits(fraction) {
        return None;
    }
    let integer = integer.trim_start_matches('0').to_owned();
    let fraction = fraction.trim_end_matches('0').to_owned();
    let is_zero = integer.is_empty() && fraction.is_empty();
    Some(Decimal {
        negative: negative && !is_zero,
        integer,
        fraction,
    })
}

fn compare_magnitude(a: &Decimal, b: &Decimal) -> Ordering {
    a.integer
        .len()
        .cmp(&b.integer.len())
        .then_with(|| a.integer.cmp(&b.integer))
        .then_with(|| a.fraction.cmp(&b.fraction))
}

pub fn compare_decimal(a: &Decimal, b: &Decimal) -> Ordering {
    match (a.negative, b.negative) {
        (false, true) => Ordering::Greater,
        (true, false) => Ordering::Less,
        (false, false) => compare_magnitude(a, b),
        (true, true) => compare_magnitude(b, a),
    }
}

fn in_range(value: &Decimal, min: Option<i128>, max: Option<i128>) -> bool {
    let bound = |n: i128| parse_decimal(&n.to_string());
    let above_min = min
        .and_then(bound)
        .map_or(true, |m| compare_decimal(value, &m) != Ordering::Less);
    let below_max = max
        .and_then(bound)
        .map_or(true, |m| compare_decimal(value, &m) != Ordering::Greater);
    above_min && below_max
}

/// Order two numeric lexical values of the same type.
pub fn compare_numeric(a: &str, b: &str) -> Option<Ordering> {
    match (parse_decimal(a), parse_decimal(b)) {
        (Some(a), Some(b)) => Some(compare_decimal(&a, &b)),
        _ => {
            let parse = |s: &str| match s {
                "INF" => Some(f64::INFINITY),
                "-INF" => Some(f64::NEG_INFINITY),
                _ => s.parse::<f64>().ok(),
            };
            parse(a)?.partial_cmp(&parse(b)?)
        }
    }
}

/// What a restricted value is made of, for facet checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Atomic(Builtin),
    List,
    Union,
}

/// Check `value` against the facets of one restriction step.
pub fn check_facets(facets: &Facets, kind: ValueKind, value: &str) -> Result<(), String> {
    let length = || match kind {
        ValueKind::Atomic(b) => b.length_of(value),
        ValueKind::List => value.split_whitespace().count(),
        ValueKind::Union => value.chars().count(),
    };
    if let Some(expected) = facets.length {
        if length() != expected {
            return Err(format!("'{value}' does not have length {expected}"));
        }
    }
    if let Some(min) = facets.min_length {
        if length() < min {
            return Err(format!("'{value}' is shorter than {min}"));
        }
    }
    if let Some(max) = facets.max_length {
        if length() > max {
            return Err(format!("'{value}' is longer than {max}"));
        }
    }
    if !facets.enumeration.is_empty() {
        let numeric = matches!(kind, ValueKind::Atomic(b) if b.is_numeric());
        let found = facets.enumeration.iter().any(|allowed| {
            if numeric {
                compare_numeric(value, allowed) == Some(Ordering::Equal)
            } else {
                allowed == value
            }
        });
        if !found {
            return Err(format!(
                "'{value}' is not one of [{}]",
                facets.enumeration.join(", ")
            ));
        }
    }
    let bounds = [
        (&facets.min_inclusive, "minInclusive"),
        (&facets.max_inclusive, "maxInclusive"),
        (&facets.min_exclusive, "minExclusive"),
        (&facets.max_exclusive, "maxExclusive"),
    ];
    for (bound, facet) in bounds {
        let Some(bound) = bound else { continue };
        match kind {
            ValueKind::Atomic(b) if b.is_numeric() => {
                let ok = match compare_numeric(value, bound) {
                    Some(order) => match facet {
                        "minInclusive" => order != Ordering::Less,
                        "maxInclusive" => order != Ordering::Greater,
                        "minExclusive" => order == Ordering::Greater,
                        _ => order == Ordering::Less,
                    },
                    None => false,
                };
                if !ok {
                    return Err(format!("'{value}' violates {facet} '{bound}'"));
                }
            }
            _ => tracing::debug!(facet, "range facet on a non-numeric type is not enforced"),
        }
    }
    if facets.total_digits.is_some() || facets.fraction_digits.is_some() {
        if let Some(decimal) = parse_decimal(value) {
            let total = decimal.integer.len() + decimal.fraction.len();
            if facets.total_digits.is_some_and(|max| total > max as usize) {
                return Err(format!("'{value}' has more than {} digits", facets.total_digits.unwrap_or(0)));
            }
            if facets
                .fraction_digits
                .is_some_and(|max| decimal.fraction.len() > max as usize)
            {
                return Err(format!(
                    "'{value}' has more than {} fraction digits",
                    facets.fraction_digits.unwrap_or(0)
                ));
            }
        }
    }
    Ok(())
}

mod date_time {
    //! Lexical forms of the date and time types.

    struct Scan<'a> {
        rest: &'a str,
    }

    impl<'a> Scan<'a> {
        fn eat(&mut self, s: &str) -> bool {
            match self.rest.strip_prefix(s) {
                Some(rest) => {
                    self.rest = rest;
                    true
                }
                None => false,
            }
        }

        fn digits(&mut self, n: usize) -> Option<u32> {
            let part = self.rest.get(..n)?;
            if !part.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            self.rest = &self.rest[n..];
            part.parse().ok()
        }

        fn year(&mut self) -> Option<i64> {
            let negative = self.eat("-");
            let end = self
                .rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(self.rest.len());
            let digits = &self.rest[..end];
            if digits.len() < 4 || (digits.len() > 4 && digits.starts_with('0')) {
                return None;
            }
            let year: i64 = digits.parse().ok()?;
            if year == 0 {
                return None;
            }
            self.rest = &self.rest[end..];
            Some(if negative { -year } else { year })
        }

        fn month(&mut self) -> Option<u32> {
            self.digits(2).filter(|m| (1..=12).contains(m))
        }

        fn time(&mut self) -> bool {
            let (Some(h), true, Some(m), true, Some(s)) = (
                self.digits(2),
                self.eat(":"),
                self.digits(2),
                self.eat(":"),
                self.digits(2),
            ) else {
                return false;
            };
            let mut fraction_zero = true;
            if self.eat(".") {
                let end = self
                    .rest
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(self.rest.len());
                if end == 0 {
                    return false;
                }
                fraction_zero = self.rest[..end].chars().all(|c| c == '0');
                self.rest = &self.rest[end..];
            }
            let end_of_day = h == 24 && m == 0 && s == 0 && fraction_zero;
            (h < 24 || end_of_day) && m < 60 && s < 60
        }

        /// Optional timezone, then end of input.
        fn finish(mut self) -> bool {
            if self.eat("Z") {
                return self.rest.is_empty();
            }
            if self.rest.is_empty() {
                return true;
            }
            if !(self.eat("+") || self.eat("-")) {
                return false;
            }
            let (Some(h), true, Some(m)) = (self.digits(2), self.eat(":"), self.digits(2)) else {
                return false;
            };
            self.rest.is_empty() && m < 60 && (h < 14 || (h == 14 && m == 0))
        }
    }

    fn days_in_month(year: Option<i64>, month: u32) -> u32 {
        match month {
            2 => match year {
                Some(y) if !(y % 4 == 0 && (y % 100 != 0 || y % 400 == 0)) => 28,
                _ => 29,
            },
            4 | 6 | 9 | 11 => 30,
            _ => 31,
        }
    }

    fn ymd(scan: &mut Scan<'_>) -> bool {
        let (Some(year), true, Some(month), true, Some(day)) = (
            scan.year(),
            scan.eat("-"),
            scan.month(),
            scan.eat("-"),
            scan.digits(2),
        ) else {
            return false;
        };
        day >= 1 && day <= days_in_month(Some(year), month)
    }

    pub fn date_time(value: &str) -> bool {
        let mut scan = Scan { rest: value };
        ymd(&mut scan) && scan.eat("T") && scan.time() && scan.finish()
    }

    pub fn date(value: &str) -> bool {
        let mut scan = Scan { rest: value };
        ymd(&mut scan) && scan.finish()
    }

    pub fn time(value: &str) -> bool {
        let mut scan = Scan { rest: value };
        scan.time() && scan.finish()
    }

    pub fn g_year_month(value: &str) -> bool {
        let mut scan = Scan { rest: value };
        scan.year().is_some() && scan.eat("-") && scan.month().is_some() && scan.finish()
    }

    pub fn g_year(value: &str) -> bool {
        let mut scan = Scan { rest: value };
        scan.year().is_some() && scan.finish()
    }

    pub fn g_month_day(value: &str) -> bool {
        let mut scan = Scan { rest: value };
        if !scan.eat("--") {
            return false;
        }
        let (Some(month), true, Some(day)) = (scan.month(), scan.eat("-"), scan.digits(2)) else {
            return false;
        };
        day >= 1 && day <= days_in_month(None, month) && scan.finish()
    }

    pub fn g_day(value: &str) -> bool {
        let mut scan = Scan { rest: value };
        scan.eat("---") && scan.digits(2).is_some_and(|d| (1..=31).contains(&d)) && scan.finish()
    }

    pub fn g_month(value: &str) -> bool {
        let mut scan = Scan { rest: value };
        scan.eat("--") && scan.month().is_some() && scan.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid(builtin: Builtin, value: &str) -> bool {
        builtin.validate(value, &|prefix: &str| prefix == "ds").is_ok()
    }

    #[test]
    fn test_collapse() {
        assert_eq!(WhiteSpace::Collapse.apply("  a \n\t b  "), "a b");
        assert_eq!(WhiteSpace::Replace.apply("a\tb"), "a b");
        assert!(matches!(WhiteSpace::Collapse.apply("ab"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_integer_ranges() {
        assert!(valid(Builtin::Integer, "123456789012345678901234567890123456789012"));
        assert!(valid(Builtin::Byte, "-128"));
        assert!(!valid(Builtin::Byte, "128"));
        assert!(valid(Builtin::UnsignedLong, "18446744073709551615"));
        assert!(!valid(Builtin::UnsignedLong, "18446744073709551616"));
        assert!(!valid(Builtin::NonNegativeInteger, "-1"));
        assert!(valid(Builtin::NonNegativeInteger, "-0"));
        assert!(!valid(Builtin::PositiveInteger, "0"));
        assert!(!valid(Builtin::Integer, "1.0"));
        assert!(!valid(Builtin::Int, "abc"));
    }

    #[test]
    fn test_date_time() {
        assert!(valid(Builtin::DateTime, "2004-07-14T09:30:00Z"));
        assert!(valid(Builtin::DateTime, "2004-07-14T09:30:00.123+02:00"));
        assert!(valid(Builtin::DateTime, "2004-07-14T24:00:00"));
        assert!(!valid(Builtin::DateTime, "2004-02-30T09:30:00Z"));
        assert!(!valid(Builtin::DateTime, "2004-07-14 09:30:00Z"));
        assert!(!valid(Builtin::DateTime, "0000-01-01T00:00:00"));
        assert!(valid(Builtin::Date, "2000-02-29"));
        assert!(!valid(Builtin::Date, "1900-02-29"));
        assert!(valid(Builtin::GMonthDay, "--02-29"));
        assert!(valid(Builtin::GDay, "---31Z"));
    }

    #[test]
    fn test_duration() {
        assert!(valid(Builtin::Duration, "P1Y2M3DT10H30M"));
        assert!(valid(Builtin::Duration, "-PT1.5S"));
        assert!(!valid(Builtin::Duration, "P"));
        assert!(!valid(Builtin::Duration, "P1DT"));
        assert!(!valid(Builtin::Duration, "P1M1Y"));
        assert!(!valid(Builtin::Duration, "P1.5Y"));
    }

    #[test]
    fn test_binary() {
        assert!(valid(Builtin::Base64Binary, "aGVs\nbG8="));
        assert!(!valid(Builtin::Base64Binary, "not base64!"));
        assert!(valid(Builtin::HexBinary, "0fA9"));
        assert!(!valid(Builtin::HexBinary, "0fA"));
        assert_eq!(Builtin::HexBinary.length_of("0fA9"), 2);
    }

    #[test]
    fn test_qname_prefix_must_be_bound() {
        assert!(valid(Builtin::QName, "ds:Signature"));
        assert!(valid(Builtin::QName, "Signature"));
        let err = Builtin::QName.validate("x:Signature", &|_: &str| false).unwrap_err();
        assert!(err.contains("not bound"));
    }

    #[test]
    fn test_names() {
        assert!(is_ncname("_id-1.a"));
        assert!(!is_ncname("a:b"));
        assert!(!is_ncname("1abc"));
        assert!(is_name("a:b"));
        assert!(valid(Builtin::Language, "en-US"));
        assert!(!valid(Builtin::Language, "toolonglang"));
        assert!(valid(Builtin::NmTokens, "a b c"));
    }

    #[test]
    fn test_float() {
        assert!(valid(Builtin::Double, "1.5E10"));
        assert!(valid(Builtin::Float, "-INF"));
        assert!(!valid(Builtin::Float, "inf"));
        assert!(!valid(Builtin::Float, "infinity"));
    }

    #[test]
    fn test_facets() {
        let facets = Facets {
            min_inclusive: Some("1".into()),
            max_exclusive: Some("10".into()),
            ..Facets::default()
        };
        let kind = ValueKind::Atomic(Builtin::Integer);
        assert!(check_facets(&facets, kind, "1").is_ok());
        assert!(check_facets(&facets, kind, "10").is_err());
        assert!(check_facets(&facets, kind, "0").is_err());

        let facets = Facets {
            enumeration: vec!["Permit".into(), "Deny".into()],
            ..Facets::default()
        };
        assert!(check_facets(&facets, ValueKind::Atomic(Builtin::String), "Deny").is_ok());
        assert!(check_facets(&facets, ValueKind::Atomic(Builtin::String), "deny").is_err());

        let facets = Facets {
            total_digits: Some(3),
            fraction_digits: Some(1),
            ..Facets::default()
        };
        let kind = ValueKind::Atomic(Builtin::Decimal);
        assert!(check_facets(&facets, kind, "12.50").is_ok());
        assert!(check_facets(&facets, kind, "1.25").is_err());
    }

    #[test]
    fn test_compare_decimal() {
        let d = |s| parse_decimal(s).unwrap();
        assert_eq!(compare_decimal(&d("-1.5"), &d("1")), Ordering::Less);
        assert_eq!(compare_decimal(&d("010.50"), &d("10.5")), Ordering::Equal);
        assert_eq!(compare_decimal(&d("-2"), &d("-10")), Ordering::Greater);
        assert_eq!(compare_decimal(&d("0.01"), &d("0.1")), Ordering::Less);
    }

    #[test]
    fn test_derives_from() {
        assert!(Builtin::UnsignedByte.derives_from(Builtin::Integer));
        assert!(Builtin::Id.derives_from(Builtin::String));
        assert!(!Builtin::Decimal.derives_from(Builtin::Integer));
        assert_eq!(Builtin::from_name("NCName"), Some(Builtin::NcName));
    }
}
