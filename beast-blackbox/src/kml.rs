//! KML flight reconstruction for a single aircraft.
//!
//! One line string, extruded to the ground, with a coordinate per airborne
//! position message. Altitudes are barometric, converted to metres.

use std::io::{self, Write};

use beast_core::{icao_to_string, Addr, AltitudeSource, ModesMessage};

const FEET_TO_METRES: f64 = 0.3048;

const KML_TRAILER: &str = "</coordinates></LineString> </Placemark></Document> </kml>\r\n";

fn preamble(icao: Addr) -> String {
    let icao = icao_to_string(icao);
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <kml xmlns=\"http://www.opengis.net/kml/2.2\"> <Document>\
         <name>KML Flight reconstruction of ICAO {icao}</name>\
         <description>Produced by beast-blackbox from a Beast binary capture</description> \
         <Style id=\"yellowLineGreenPoly\"><LineStyle><color>7fffae1f</color><width>4</width></LineStyle>\
         <PolyStyle><color>7fb8581b</color></PolyStyle></Style> \
         <Placemark><name>ICAO {icao}</name><description>Flight</description>\
         <styleUrl>#yellowLineGreenPoly</styleUrl><LineString><extrude>1</extrude>\
         <tessellate>1</tessellate><altitudeMode>absolute</altitudeMode><coordinates>\r\n"
    )
}

/// `lon,lat,alt_m` for an airborne position with a usable barometric
/// altitude, else `None`.
///
/// GNSS altitudes are converted back to baro with the aircraft's known delta;
/// without one the point is skipped.
pub fn coordinate_line(mm: &ModesMessage) -> Option<String> {
    if !mm.is_extended_squitter() || !matches!(mm.metype, Some(9..=18)) {
        return None;
    }
    let alt = mm.altitude?;
    let pos = mm.position?;
    let feet = match alt.source {
        AltitudeSource::Baro => alt.feet,
        AltitudeSource::Gnss => alt.feet - mm.track_gnss_delta?,
    };
    Some(format!(
        "{:.5},{:.5},{:.1}\r\n",
        pos.lon,
        pos.lat,
        feet as f64 * FEET_TO_METRES
    ))
}

/// Streams a KML document: preamble on creation, one coordinate per
/// position, trailer on `finish`.
pub struct KmlWriter<W: Write> {
    out: W,
    points: u64,
}

impl<W: Write> KmlWriter<W> {
    pub fn new(mut out: W, icao: Addr) -> io::Result<Self> {
        out.write_all(preamble(icao).as_bytes())?;
        Ok(KmlWriter { out, points: 0 })
    }

    /// Append the message's position if it has one. Returns whether a point
    /// was written.
    pub fn write_position(&mut self, mm: &ModesMessage) -> io::Result<bool> {
        let Some(line) = coordinate_line(mm) else {
            return Ok(false);
        };
        self.out.write_all(line.as_bytes())?;
        self.points += 1;
        Ok(true)
    }

    pub fn points(&self) -> u64 {
        self.points
    }

    /// Close the document and hand back the writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.out.write_all(KML_TRAILER.as_bytes())?;
        self.out.flush()?;
        Ok(self.out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
