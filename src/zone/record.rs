use super::{Result, ZoneError};
use crate::dns::enums::RecordType;
use crate::geo::Location;
use crate::health::HealthTest;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Start-of-authority fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Soa {
    pub mname: String,
    pub rname: String,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

/// Typed record data, one variant per supported record type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ns(String),
    /// In-zone alias; resolution continues at the named label
    Mf(String),
    Cname(String),
    Ptr(String),
    Mx {
        preference: u16,
        exchange: String,
    },
    Txt(Vec<String>),
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
    Soa(Soa),
}

impl RecordData {
    pub fn rtype(&self) -> RecordType {
        match self {
            RecordData::A(_) => RecordType::A,
            RecordData::Aaaa(_) => RecordType::AAAA,
            RecordData::Ns(_) => RecordType::NS,
            RecordData::Mf(_) => RecordType::MF,
            RecordData::Cname(_) => RecordType::CNAME,
            RecordData::Ptr(_) => RecordType::PTR,
            RecordData::Mx { .. } => RecordType::MX,
            RecordData::Txt(_) => RecordType::TXT,
            RecordData::Srv { .. } => RecordType::SRV,
            RecordData::Soa(_) => RecordType::SOA,
        }
    }
}

/// A single resource record value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    /// Owner name, without the trailing dot
    pub name: String,
    pub ttl: u32,
    pub data: RecordData,
}

impl ResourceRecord {
    pub fn new(name: impl Into<String>, ttl: u32, data: RecordData) -> Self {
        Self {
            name: name.into(),
            ttl,
            data,
        }
    }

    pub fn rtype(&self) -> RecordType {
        self.data.rtype()
    }

    /// Address carried by A/AAAA records
    pub fn ip(&self) -> Option<IpAddr> {
        match self.data {
            RecordData::A(addr) => Some(IpAddr::V4(addr)),
            RecordData::Aaaa(addr) => Some(IpAddr::V6(addr)),
            _ => None,
        }
    }

    /// Label an MF record forwards to
    pub fn alias_target(&self) -> Option<&str> {
        match &self.data {
            RecordData::Mf(target) => Some(target),
            _ => None,
        }
    }

    pub fn soa(&self) -> Option<&Soa> {
        match &self.data {
            RecordData::Soa(soa) => Some(soa),
            _ => None,
        }
    }

    /// Parse a record in presentation format: `name [ttl] [IN] TYPE rdata...`
    pub fn parse(text: &str) -> Result<Self> {
        let tokens = tokenize(text)?;
        let mut tokens = tokens.iter().map(String::as_str);

        let name = tokens
            .next()
            .ok_or_else(|| ZoneError::ParseError("empty record".to_string()))?;
        let name = normalize_name(name)?;

        let mut ttl = None;
        let mut rtype = None;
        for token in tokens.by_ref() {
            if token.eq_ignore_ascii_case("IN") {
                continue;
            }
            if token.bytes().all(|b| b.is_ascii_digit()) {
                if ttl.is_some() {
                    return Err(ZoneError::InvalidTTL(token.to_string()));
                }
                ttl = Some(
                    token
                        .parse::<u32>()
                        .map_err(|_| ZoneError::InvalidTTL(token.to_string()))?,
                );
                continue;
            }
            rtype = Some(
                token
                    .parse::<RecordType>()
                    .map_err(ZoneError::InvalidRRType)?,
            );
            break;
        }

        let rtype =
            rtype.ok_or_else(|| ZoneError::ParseError(format!("missing record type: {}", text)))?;
        let rdata: Vec<&str> = tokens.collect();
        let data = parse_rdata(rtype, &rdata)?;

        Ok(Self {
            name,
            ttl: ttl.unwrap_or(0),
            data,
        })
    }
}

impl fmt::Display for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {} IN {} ", self.name, self.ttl, self.rtype())?;
        match &self.data {
            RecordData::A(addr) => write!(f, "{}", addr),
            RecordData::Aaaa(addr) => write!(f, "{}", addr),
            RecordData::Ns(name)
            | RecordData::Mf(name)
            | RecordData::Cname(name)
            | RecordData::Ptr(name) => write!(f, "{}.", name),
            RecordData::Mx {
                preference,
                exchange,
            } => write!(f, "{} {}.", preference, exchange),
            RecordData::Txt(strings) => {
                let quoted: Vec<String> = strings
                    .iter()
                    .map(|s| format!("\"{}\"", s.replace('"', "\\\"")))
                    .collect();
                write!(f, "{}", quoted.join(" "))
            }
            RecordData::Srv {
                priority,
                weight,
                port,
                target,
            } => write!(f, "{} {} {} {}.", priority, weight, port, target),
            RecordData::Soa(soa) => write!(
                f,
                "{}. {}. {} {} {} {} {}",
                soa.mname, soa.rname, soa.serial, soa.refresh, soa.retry, soa.expire, soa.minimum
            ),
        }
    }
}

/// Split on whitespace, keeping double-quoted strings together
fn tokenize(text: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = text.trim().chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut token = String::new();
        if c == '"' {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            token.push(escaped);
                        }
                    }
                    '"' => {
                        closed = true;
                        break;
                    }
                    _ => token.push(c),
                }
            }
            if !closed {
                return Err(ZoneError::ParseError(format!("unterminated string in: {}", text)));
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
        }
        tokens.push(token);
    }

    Ok(tokens)
}

/// Validate a domain name and strip the trailing dot
fn normalize_name(name: &str) -> Result<String> {
    if name == "." {
        return Ok(String::new());
    }
    let trimmed = name.strip_suffix('.').unwrap_or(name);
    if trimmed.is_empty() || trimmed.len() > 253 {
        return Err(ZoneError::InvalidDomainName(name.to_string()));
    }
    for label in trimmed.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(ZoneError::InvalidDomainName(name.to_string()));
        }
        if label.chars().any(|c| c.is_whitespace() || c == '"' || c == '@') {
            return Err(ZoneError::InvalidDomainName(name.to_string()));
        }
    }
    Ok(trimmed.to_string())
}

fn expect_fields(rtype: RecordType, rdata: &[&str], count: usize) -> Result<()> {
    if rdata.len() != count {
        return Err(ZoneError::InvalidRecord(format!(
            "{} record requires {} fields, got {}",
            rtype,
            count,
            rdata.len()
        )));
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(rtype: RecordType, field: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| ZoneError::InvalidRecord(format!("Invalid {} {}: {}", rtype, field, value)))
}

fn parse_rdata(rtype: RecordType, rdata: &[&str]) -> Result<RecordData> {
    match rtype {
        RecordType::A => {
            expect_fields(rtype, rdata, 1)?;
            let addr = rdata[0]
                .parse::<Ipv4Addr>()
                .map_err(|_| ZoneError::InvalidRecord(format!("Invalid IPv4 address: {}", rdata[0])))?;
            Ok(RecordData::A(addr))
        }
        RecordType::AAAA => {
            expect_fields(rtype, rdata, 1)?;
            let addr = rdata[0]
                .parse::<Ipv6Addr>()
                .map_err(|_| ZoneError::InvalidRecord(format!("Invalid IPv6 address: {}", rdata[0])))?;
            Ok(RecordData::Aaaa(addr))
        }
        RecordType::NS => {
            expect_fields(rtype, rdata, 1)?;
            Ok(RecordData::Ns(normalize_name(rdata[0])?))
        }
        RecordType::MF => {
            expect_fields(rtype, rdata, 1)?;
            Ok(RecordData::Mf(normalize_name(rdata[0])?))
        }
        RecordType::CNAME => {
            expect_fields(rtype, rdata, 1)?;
            Ok(RecordData::Cname(normalize_name(rdata[0])?))
        }
        RecordType::PTR => {
            expect_fields(rtype, rdata, 1)?;
            Ok(RecordData::Ptr(normalize_name(rdata[0])?))
        }
        RecordType::MX => {
            expect_fields(rtype, rdata, 2)?;
            Ok(RecordData::Mx {
                preference: parse_number(rtype, "priority", rdata[0])?,
                exchange: normalize_name(rdata[1])?,
            })
        }
        RecordType::TXT => {
            if rdata.is_empty() {
                return Err(ZoneError::InvalidRecord("TXT record requires text".to_string()));
            }
            // Character strings are limited to 255 bytes on the wire
            let mut strings = Vec::new();
            for text in rdata {
                let mut rest = *text;
                while rest.len() > 255 {
                    let mut split = 255;
                    while !rest.is_char_boundary(split) {
                        split -= 1;
                    }
                    strings.push(rest[..split].to_string());
                    rest = &rest[split..];
                }
                strings.push(rest.to_string());
            }
            Ok(RecordData::Txt(strings))
        }
        RecordType::SRV => {
            expect_fields(rtype, rdata, 4)?;
            Ok(RecordData::Srv {
                priority: parse_number(rtype, "priority", rdata[0])?,
                weight: parse_number(rtype, "weight", rdata[1])?,
                port: parse_number(rtype, "port", rdata[2])?,
                target: normalize_name(rdata[3])?,
            })
        }
        RecordType::SOA => {
            expect_fields(rtype, rdata, 7)?;
            Ok(RecordData::Soa(Soa {
                mname: normalize_name(rdata[0])?,
                rname: normalize_name(rdata[1])?,
                serial: parse_number(rtype, "serial", rdata[2])?,
                refresh: parse_number(rtype, "refresh", rdata[3])?,
                retry: parse_number(rtype, "retry", rdata[4])?,
                expire: parse_number(rtype, "expire", rdata[5])?,
                minimum: parse_number(rtype, "minimum", rdata[6])?,
            }))
        }
        RecordType::ANY => Err(ZoneError::InvalidRRType(
            "ANY is not valid in zone data".to_string(),
        )),
    }
}

/// A record as stored in a zone, with the engine's selection metadata
#[derive(Debug, Clone)]
pub struct Record {
    pub rr: ResourceRecord,
    /// Relative selection weight
    pub weight: u32,
    /// Resolved location, only for A records under "closest" labels
    pub loc: Option<Location>,
    /// Private health test, set while health checks are running
    pub test: Option<Arc<HealthTest>>,
}

impl Record {
    pub fn new(rr: ResourceRecord) -> Self {
        Self {
            rr,
            weight: 0,
            loc: None,
            test: None,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// A record without a test is always considered healthy
    pub fn is_healthy(&self) -> bool {
        self.test.as_ref().is_none_or(|test| test.is_healthy())
    }
}

/// Ordered records of one type under one label
#[derive(Debug, Clone, Default)]
pub struct Records(Vec<Record>);

impl Records {
    /// Heaviest first; equal weights keep insertion order
    pub fn sort_by_weight(&mut self) {
        self.0.sort_by(|a, b| b.weight.cmp(&a.weight));
    }
}

impl From<Vec<Record>> for Records {
    fn from(records: Vec<Record>) -> Self {
        Self(records)
    }
}

impl Deref for Records {
    type Target = Vec<Record>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Records {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_a_record() {
        let rr = ResourceRecord::parse("www.example.com. 300 IN A 192.0.2.1").unwrap();
        assert_eq!(rr.name, "www.example.com");
        assert_eq!(rr.ttl, 300);
        assert_eq!(rr.rtype(), RecordType::A);
        assert_eq!(rr.ip(), Some("192.0.2.1".parse().unwrap()));
    }

    #[test]
    fn test_parse_without_ttl_or_class() {
        let rr = ResourceRecord::parse("example.com. NS ns1.example.net.").unwrap();
        assert_eq!(rr.ttl, 0);
        assert_eq!(rr.data, RecordData::Ns("ns1.example.net".to_string()));
    }

    #[test]
    fn test_parse_soa() {
        let rr = ResourceRecord::parse(
            "example.com. 1200 IN SOA ns1.example.com hostmaster.example.com 3 5400 5400 1209600 3600",
        )
        .unwrap();
        let soa = rr.soa().unwrap();
        assert_eq!(soa.mname, "ns1.example.com");
        assert_eq!(soa.rname, "hostmaster.example.com");
        assert_eq!(soa.serial, 3);
        assert_eq!(soa.expire, 1209600);
    }

    #[test]
    fn test_parse_soa_wrong_field_count() {
        let err = ResourceRecord::parse(
            "example.com. 1200 IN SOA ns1 host master 3 5400 5400 1209600 3600",
        )
        .unwrap_err();
        assert!(matches!(err, ZoneError::InvalidRecord(_)));
    }

    #[test]
    fn test_parse_txt_with_quotes() {
        let rr = ResourceRecord::parse(r#"txt.example.com. 1 IN TXT "hello world" "a \"b\"""#)
            .unwrap();
        assert_eq!(
            rr.data,
            RecordData::Txt(vec!["hello world".to_string(), "a \"b\"".to_string()])
        );
        assert!(ResourceRecord::parse(r#"t.example.com. TXT "open"#).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(ResourceRecord::parse("").is_err());
        assert!(ResourceRecord::parse("www.example.com. 300 IN A 300.1.1.1").is_err());
        assert!(ResourceRecord::parse("www.example.com. 300 IN NAPTR x").is_err());
        assert!(ResourceRecord::parse("www.example.com. ANY").is_err());
        let long_label = format!("{}.example.com. A 192.0.2.1", "a".repeat(64));
        assert!(matches!(
            ResourceRecord::parse(&long_label),
            Err(ZoneError::InvalidDomainName(_))
        ));
    }

    #[test]
    fn test_display_parses_back() {
        let text = "mail.example.com. 60 IN MX 10 mx.example.com.";
        let rr = ResourceRecord::parse(text).unwrap();
        assert_eq!(rr.to_string(), text);
        assert_eq!(ResourceRecord::parse(&rr.to_string()).unwrap(), rr);
    }

    #[test]
    fn test_sort_by_weight_is_stable() {
        let a = |ip: &str, w| {
            Record::new(ResourceRecord::new("x", 0, RecordData::A(ip.parse().unwrap()))).with_weight(w)
        };
        let mut records = Records::from(vec![
            a("192.0.2.1", 1),
            a("192.0.2.2", 5),
            a("192.0.2.3", 1),
            a("192.0.2.4", 5),
        ]);
        records.sort_by_weight();
        let order: Vec<String> = records
            .iter()
            .map(|r| r.rr.ip().unwrap().to_string())
            .collect();
        assert_eq!(order, ["192.0.2.2", "192.0.2.4", "192.0.2.1", "192.0.2.3"]);
    }
}
