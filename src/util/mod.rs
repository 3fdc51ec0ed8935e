//! util — общие утилиты (вынесено из разных модулей).
//!
//! Содержит:
//! - now_ts(): текущее Unix-время (секунды + наносекунды).
//! - parse_since_spec(): разбор `-t` (epoch seconds или `30m`/`12h`/`1d`/`4w`).
//! - id hex helpers: полный hex, короткий префикс для логов, обратный разбор.
//! - parse_remote_spec(): разбор `host:port:family` бутстрап-адреса.

use anyhow::{anyhow, Result};

use crate::blob::Id;
use crate::consts::ID_SIZE;

/// Текущее Unix-время: (секунды, наносекунды).
#[inline]
pub fn now_ts() -> (u64, u64) {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (now.as_secs(), now.subsec_nanos() as u64)
}

/// Parse the `-t` time spec into an absolute epoch-seconds cutoff.
///
/// Accepts plain epoch seconds ("1700000000") or a relative age with a
/// suffix: `s`, `m`, `h`, `d`, `w` ("12h" = now minus twelve hours).
pub fn parse_since_spec(spec: &str) -> Result<u64> {
    let s = spec.trim();
    if s.is_empty() {
        return Err(anyhow!("empty time spec"));
    }

    let (num, mult) = match s.as_bytes()[s.len() - 1] {
        b's' => (&s[..s.len() - 1], 1u64),
        b'm' => (&s[..s.len() - 1], 60),
        b'h' => (&s[..s.len() - 1], 3600),
        b'd' => (&s[..s.len() - 1], 86400),
        b'w' => (&s[..s.len() - 1], 7 * 86400),
        _ => {
            // без суффикса — абсолютные epoch seconds
            return s
                .parse::<u64>()
                .map_err(|e| anyhow!("bad time spec '{}': {}", s, e));
        }
    };

    let n = num
        .parse::<u64>()
        .map_err(|e| anyhow!("bad time spec '{}': {}", s, e))?;
    let (now, _) = now_ts();
    Ok(now.saturating_sub(n.saturating_mul(mult)))
}

/// Parse the `-r host:port:family` bootstrap spec. Family 2 (IPv4) and
/// 10 (IPv6) are accepted; the returned address is `host:port`.
pub fn parse_remote_spec(spec: &str) -> Result<(String, u32)> {
    let s = spec.trim();
    let Some(idx) = s.rfind(':') else {
        return Err(anyhow!("bad remote spec '{}': want host:port:family", s));
    };
    let family = s[idx + 1..]
        .parse::<u32>()
        .map_err(|_| anyhow!("bad remote spec '{}': want host:port:family", s))?;
    if family != 2 && family != 10 {
        return Err(anyhow!("bad address family {} in '{}'", family, s));
    }
    let addr = &s[..idx];
    if addr.rfind(':').is_none() {
        return Err(anyhow!("bad remote spec '{}': missing port", s));
    }
    Ok((addr.to_string(), family))
}

/// Full lowercase hex of an identifier.
pub fn id_to_hex(id: &Id) -> String {
    let mut out = String::with_capacity(ID_SIZE * 2);
    for b in id.iter() {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Short hex prefix for log lines.
pub fn short_id(id: &Id) -> String {
    let mut out = String::with_capacity(12);
    for b in id.iter().take(6) {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Parse a full-width identifier from hex.
pub fn id_from_hex(s: &str) -> Result<Id> {
    let s = s.trim();
    if s.len() != ID_SIZE * 2 {
        return Err(anyhow!(
            "bad id hex length {} (want {})",
            s.len(),
            ID_SIZE * 2
        ));
    }
    let mut id = [0u8; ID_SIZE];
    let bytes = s.as_bytes();
    for i in 0..ID_SIZE {
        let h = (bytes[2 * i] as char)
            .to_digit(16)
            .ok_or_else(|| anyhow!("invalid hex at pos {}", 2 * i))?;
        let l = (bytes[2 * i + 1] as char)
            .to_digit(16)
            .ok_or_else(|| anyhow!("invalid hex at pos {}", 2 * i + 1))?;
        id[i] = ((h << 4) | l) as u8;
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_spec_absolute_and_relative() {
        assert_eq!(parse_since_spec("1700000000").expect("abs"), 1_700_000_000);

        let (now, _) = now_ts();
        let t = parse_since_spec("12h").expect("12h");
        assert!(t <= now.saturating_sub(12 * 3600));
        assert!(t >= now.saturating_sub(12 * 3600 + 5));

        assert!(parse_since_spec("").is_err());
        assert!(parse_since_spec("12x").is_err());
    }

    #[test]
    fn remote_spec_parsing() {
        let (addr, family) = parse_remote_spec("node1:1025:2").expect("parse");
        assert_eq!(addr, "node1:1025");
        assert_eq!(family, 2);

        assert!(parse_remote_spec("node1:1025").is_err());
        assert!(parse_remote_spec("node1:1025:7").is_err());
    }

    #[test]
    fn id_hex_roundtrip() {
        let mut id = [0u8; ID_SIZE];
        id[0] = 0xde;
        id[1] = 0xad;
        id[ID_SIZE - 1] = 0x01;
        let hex = id_to_hex(&id);
        assert_eq!(hex.len(), ID_SIZE * 2);
        assert!(hex.starts_with("dead"));
        assert_eq!(id_from_hex(&hex).expect("roundtrip"), id);
        assert!(id_from_hex("zz").is_err());
    }
}
