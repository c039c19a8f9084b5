//! Acquisition modes for the Avanti goniometer adapter
//!
//! The base accepts `SENSOR {n} SETMODE {mode}` with an opaque mode number;
//! this is the closed set that is meaningful for goniometer-equipped sensors.

/// Goniometer acquisition mode, by device mode number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum GoniometerMode {
    Mode362 = 362, // SIG x2 @296Hz, ACC 2g, GYRO 250dps
    Mode363 = 363, // SIG x2 @296Hz, ACC 4g, GYRO 250dps
    Mode364 = 364, // SIG x2 @296Hz, ACC 8g, GYRO 250dps
    Mode365 = 365, // SIG x2 @296Hz, ACC 16g, GYRO 250dps
    Mode366 = 366, // SIG x2 @296Hz, ACC 2g, GYRO 500dps
    Mode367 = 367, // SIG x2 @296Hz, ACC 4g, GYRO 500dps
    Mode368 = 368, // SIG x2 @296Hz, ACC 8g, GYRO 500dps
    Mode369 = 369, // SIG x2 @296Hz, ACC 16g, GYRO 500dps
    Mode370 = 370, // SIG x2 @296Hz, ACC 2g, GYRO 1000dps
    Mode371 = 371, // SIG x2 @296Hz, ACC 4g, GYRO 1000dps
    Mode372 = 372, // SIG x2 @296Hz, ACC 8g, GYRO 1000dps
    Mode373 = 373, // SIG x2 @296Hz, ACC 16g, GYRO 1000dps
    Mode374 = 374, // SIG x2 @296Hz, ACC 2g, GYRO 2000dps
    Mode375 = 375, // SIG x2 @296Hz, ACC 4g, GYRO 2000dps
    Mode376 = 376, // SIG x2 @296Hz, ACC 8g, GYRO 2000dps
    Mode377 = 377, // SIG x2 @296Hz, ACC 16g, GYRO 2000dps
    Mode378 = 378, // SIG x2 @370Hz, or 32-bit @74Hz
    Mode26 = 26,   // 1 HF chan @1926Hz, 1 LF chan @148Hz
    Mode244 = 244, // SIG x2 @519Hz
}

impl GoniometerMode {
    pub const ALL: [GoniometerMode; 19] = [
        GoniometerMode::Mode362,
        GoniometerMode::Mode363,
        GoniometerMode::Mode364,
        GoniometerMode::Mode365,
        GoniometerMode::Mode366,
        GoniometerMode::Mode367,
        GoniometerMode::Mode368,
        GoniometerMode::Mode369,
        GoniometerMode::Mode370,
        GoniometerMode::Mode371,
        GoniometerMode::Mode372,
        GoniometerMode::Mode373,
        GoniometerMode::Mode374,
        GoniometerMode::Mode375,
        GoniometerMode::Mode376,
        GoniometerMode::Mode377,
        GoniometerMode::Mode378,
        GoniometerMode::Mode26,
        GoniometerMode::Mode244,
    ];

    /// Device mode number as sent in `SETMODE`
    pub fn number(&self) -> u16 {
        *self as u16
    }

    pub fn from_number(n: u16) -> Option<Self> {
        GoniometerMode::ALL.into_iter().find(|m| m.number() == n)
    }

    pub fn description(&self) -> &'static str {
        match self {
            GoniometerMode::Mode362 => "SIG x2 @296Hz, ACC 2g, GYRO 250dps",
            GoniometerMode::Mode363 => "SIG x2 @296Hz, ACC 4g, GYRO 250dps",
            GoniometerMode::Mode364 => "SIG x2 @296Hz, ACC 8g, GYRO 250dps",
            GoniometerMode::Mode365 => "SIG x2 @296Hz, ACC 16g, GYRO 250dps",
            GoniometerMode::Mode366 => "SIG x2 @296Hz, ACC 2g, GYRO 500dps",
            GoniometerMode::Mode367 => "SIG x2 @296Hz, ACC 4g, GYRO 500dps",
            GoniometerMode::Mode368 => "SIG x2 @296Hz, ACC 8g, GYRO 500dps",
            GoniometerMode::Mode369 => "SIG x2 @296Hz, ACC 16g, GYRO 500dps",
            GoniometerMode::Mode370 => "SIG x2 @296Hz, ACC 2g, GYRO 1000dps",
            GoniometerMode::Mode371 => "SIG x2 @296Hz, ACC 4g, GYRO 1000dps",
            GoniometerMode::Mode372 => "SIG x2 @296Hz, ACC 8g, GYRO 1000dps",
            GoniometerMode::Mode373 => "SIG x2 @296Hz, ACC 16g, GYRO 1000dps",
            GoniometerMode::Mode374 => "SIG x2 @296Hz, ACC 2g, GYRO 2000dps",
            GoniometerMode::Mode375 => "SIG x2 @296Hz, ACC 4g, GYRO 2000dps",
            GoniometerMode::Mode376 => "SIG x2 @296Hz, ACC 8g, GYRO 2000dps",
            GoniometerMode::Mode377 => "SIG x2 @296Hz, ACC 16g, GYRO 2000dps",
            GoniometerMode::Mode378 => "SIG x2 @370Hz, or 32-bit @74Hz",
            GoniometerMode::Mode26 => "1 HF chan @1926Hz, 1 LF chan @148Hz",
            GoniometerMode::Mode244 => "SIG x2 @519Hz",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_round_trip() {
        for mode in GoniometerMode::ALL {
            assert_eq!(GoniometerMode::from_number(mode.number()), Some(mode));
        }
        assert_eq!(GoniometerMode::from_number(999), None);
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(
            GoniometerMode::Mode362.description(),
            "SIG x2 @296Hz, ACC 2g, GYRO 250dps"
        );
        assert_eq!(GoniometerMode::Mode244.description(), "SIG x2 @519Hz");
        assert_eq!(GoniometerMode::Mode26.number(), 26);
    }
}
