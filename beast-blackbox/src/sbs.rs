//! SBS (BaseStation) text lines.
//!
//! ```plain
//! MSG,3,1,1,40621D,1,2019/03/01,10:00:00.123,2024/05/02,18:01:02.456,,38000,,,52.25720,3.91937,,,0,,0,0
//! ```
//! Type, constants, address, reception date/time, logged date/time,
//! callsign, altitude, ground speed, track, lat, lon, vertical rate, squawk,
//! alert, emergency, ident, on-ground. CR LF terminated.

use std::fmt::Write as _;

use chrono::{DateTime, Local, Utc};

use beast_core::{AirGround, AltitudeSource, HeadingSource, ModesMessage, SpeedSource};

use crate::config::FilterConfig;

const EMERGENCY_SQUAWKS: [u16; 3] = [0x7500, 0x7600, 0x7700];

/// SBS message type for a downlink format, or `None` if SBS has no line
/// for it.
pub fn sbs_type(mm: &ModesMessage) -> Option<u8> {
    match mm.df {
        4 | 20 => Some(5),
        5 | 21 => Some(6),
        0 | 16 => Some(7),
        11 => Some(8),
        17 | 18 => match mm.metype? {
            1..=4 => Some(1),
            5..=8 => Some(2),
            9..=18 => Some(3),
            19 => Some(4),
            _ => None,
        },
        _ => None,
    }
}

fn flag(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "-1",
        Some(false) => "0",
        None => "",
    }
}

/// Format one line, or `None` if the message has no SBS form, is not from a
/// real ICAO address, or is filtered out.
pub fn format_sbs(mm: &ModesMessage, filter: &FilterConfig, now: DateTime<Local>) -> Option<String> {
    if !mm.is_icao() || !filter.matches(mm.addr) {
        return None;
    }
    let msg_type = sbs_type(mm)?;

    let mut line = String::with_capacity(160);
    let received = if filter.local_time {
        mm.time.with_timezone(&Local).format("%Y/%m/%d,%H:%M:%S%.3f")
    } else {
        mm.time.with_timezone(&Utc).format("%Y/%m/%d,%H:%M:%S%.3f")
    };
    // writing into a String can't fail
    let _ = write!(
        line,
        "MSG,{msg_type},1,1,{:06X},1,{received},{}",
        mm.addr & 0xFFFFFF,
        now.format("%Y/%m/%d,%H:%M:%S%.3f"),
    );

    line.push(',');
    if let Some(callsign) = &mm.callsign {
        line.push_str(callsign);
    }

    line.push(',');
    if let Some(alt) = mm.altitude {
        let delta = mm.track_gnss_delta;
        let field = match (filter.gnss, alt.source, delta) {
            (true, AltitudeSource::Gnss, _) => format!("{}H", alt.feet),
            (true, AltitudeSource::Baro, Some(d)) => format!("{}H", alt.feet + d),
            (true, AltitudeSource::Baro, None) => alt.feet.to_string(),
            (false, AltitudeSource::Baro, _) => alt.feet.to_string(),
            (false, AltitudeSource::Gnss, Some(d)) => (alt.feet - d).to_string(),
            (false, AltitudeSource::Gnss, None) => String::new(),
        };
        line.push_str(&field);
    }

    line.push(',');
    if let Some(speed) = mm.speed.filter(|s| s.source == SpeedSource::Ground) {
        let _ = write!(line, "{}", speed.knots);
    }

    line.push(',');
    if let Some(heading) = mm.heading.filter(|h| h.source == HeadingSource::True) {
        let _ = write!(line, "{}", heading.degrees);
    }

    match mm.position {
        Some(pos) => {
            let _ = write!(line, ",{:.5},{:.5}", pos.lat, pos.lon);
        }
        None => line.push_str(",,"),
    }

    line.push(',');
    if let Some(rate) = mm.vert_rate {
        let _ = write!(line, "{rate}");
    }

    line.push(',');
    if let Some(squawk) = mm.squawk {
        let _ = write!(line, "{squawk:04x}");
    }

    let _ = write!(
        line,
        ",{},{},{}",
        flag(mm.alert),
        flag(mm.squawk.map(|s| EMERGENCY_SQUAWKS.contains(&s))),
        flag(mm.spi),
    );

    line.push_str(match mm.airground {
        AirGround::Ground => ",-1",
        AirGround::Airborne => ",0",
        _ => ",",
    });

    line.push_str("\r\n");
    Some(line)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use beast_core::{Altitude, Heading, Position, Speed, NON_ICAO_ADDRESS};

    fn now() -> DateTime<Local> {
        DateTime::from_timestamp(1_714_672_862, 456_000_000)
            .unwrap()
            .with_timezone(&Local)
    }

    fn position_msg() -> ModesMessage {
        ModesMessage {
            df: 17,
            addr: 0x40621D,
            metype: Some(11),
            time: DateTime::from_timestamp(1_551_434_400, 123_456_789).unwrap(),
            altitude: Some(Altitude {
                feet: 38000,
                source: AltitudeSource::Baro,
            }),
            position: Some(Position {
                lat: 52.257202,
                lon: 3.919373,
            }),
            airground: AirGround::Airborne,
            ..Default::default()
        }
    }

    fn fields(line: &str) -> Vec<&str> {
        line.trim_end_matches("\r\n").split(',').collect()
    }

    #[test]
    fn test_position_line() {
        let line = format_sbs(&position_msg(), &FilterConfig::default(), now()).unwrap();
        assert!(line.ends_with("\r\n"));
        let f = fields(&line);
        assert_eq!(f.len(), 22);
        assert_eq!(&f[..6], &["MSG", "3", "1", "1", "40621D", "1"]);
        assert_eq!(f[6], "2019/03/01");
        assert_eq!(f[7], "10:00:00.123");
        assert_eq!(f[11], "38000");
        assert_eq!(f[14], "52.25720");
        assert_eq!(f[15], "3.91937");
        assert_eq!(f[21], "0");
    }

    #[test]
    fn test_velocity_and_squawk_fields() {
        let mm = ModesMessage {
            df: 17,
            addr: 0x485020,
            metype: Some(19),
            speed: Some(Speed {
                knots: 159,
                source: SpeedSource::Ground,
            }),
            heading: Some(Heading {
                degrees: 182,
                source: HeadingSource::True,
            }),
            vert_rate: Some(-832),
            ..Default::default()
        };
        let line = format_sbs(&mm, &FilterConfig::default(), now()).unwrap();
        let f = fields(&line);
        assert_eq!(f[1], "4");
        assert_eq!(f[12], "159");
        assert_eq!(f[13], "182");
        assert_eq!(f[16], "-832");
        assert_eq!(f[21], "");
    }

    #[test]
    fn test_emergency_squawk() {
        let mm = ModesMessage {
            df: 5,
            addr: 0x4840D6,
            squawk: Some(0x7700),
            alert: Some(true),
            spi: Some(false),
            airground: AirGround::Ground,
            ..Default::default()
        };
        let f_line = format_sbs(&mm, &FilterConfig::default(), now()).unwrap();
        let f = fields(&f_line);
        assert_eq!(f[1], "6");
        assert_eq!(f[17], "7700");
        assert_eq!(f[18], "-1");
        assert_eq!(f[19], "-1");
        assert_eq!(f[20], "0");
        assert_eq!(f[21], "-1");
    }

    #[test]
    fn test_gnss_altitude() {
        let mut mm = position_msg();
        mm.track_gnss_delta = Some(550);

        let gnss = FilterConfig {
            gnss: true,
            ..Default::default()
        };
        let f_line = format_sbs(&mm, &gnss, now()).unwrap();
        assert_eq!(fields(&f_line)[11], "38550H");

        mm.altitude = Some(Altitude {
            feet: 38550,
            source: AltitudeSource::Gnss,
        });
        let f_line = format_sbs(&mm, &FilterConfig::default(), now()).unwrap();
        assert_eq!(fields(&f_line)[11], "38000");

        mm.track_gnss_delta = None;
        let f_line = format_sbs(&mm, &FilterConfig::default(), now()).unwrap();
        assert_eq!(fields(&f_line)[11], "");
    }

    #[test]
    fn test_suppressed() {
        let filter = FilterConfig {
            icao: Some(0x4840D6),
            ..Default::default()
        };
        assert!(format_sbs(&position_msg(), &filter, now()).is_none());

        let mut mm = position_msg();
        mm.addr = NON_ICAO_ADDRESS | 0x7700;
        assert!(format_sbs(&mm, &FilterConfig::default(), now()).is_none());

        let mut mm = position_msg();
        mm.metype = Some(28);
        assert!(format_sbs(&mm, &FilterConfig::default(), now()).is_none());
    }

    #[test]
    fn test_sbs_types() {
        let of = |df, metype| {
            sbs_type(&ModesMessage {
                df,
                metype,
                ..Default::default()
            })
        };
        assert_eq!(of(20, None), Some(5));
        assert_eq!(of(21, None), Some(6));
        assert_eq!(of(16, None), Some(7));
        assert_eq!(of(11, None), Some(8));
        assert_eq!(of(17, Some(3)), Some(1));
        assert_eq!(of(18, Some(6)), Some(2));
        assert_eq!(of(17, None), None);
        assert_eq!(of(24, None), None);
    }
}
