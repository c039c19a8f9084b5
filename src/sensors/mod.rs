//! Sensor descriptors, discovery, and the registry that owns the ring buffers
//!
//! The base station has 16 pairing slots. At session setup each slot is
//! interrogated over the command channel; paired slots yield a
//! [`SensorDescriptor`] whose start index positions the sensor's channel rows
//! inside its family's frames. The [`SensorRegistry`] owns the descriptors and
//! both sample rings of every paired sensor for the life of the session.

pub mod modes;

pub use modes::GoniometerMode;

use crate::buffer::SampleRing;
use crate::control::ControlChannel;
use crate::error::{Error, Result};
use crate::protocol::{SensorFamily, SignalKind, StreamKind, AUX_SLOT_STRIDE, SENSOR_SLOTS};
use std::ops::Range;

/// Hardware model reported by `SENSOR {n} TYPE?`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorModel {
    Avanti,
    Legacy,
    /// Avanti body with the goniometer adapter fitted
    AvantiGoniometer,
}

impl SensorModel {
    /// Parse the device type code (`"O"`, `"A"`, `"23"`)
    pub fn from_type_code(code: &str) -> Result<Self> {
        match code {
            "O" => Ok(SensorModel::Avanti),
            "A" => Ok(SensorModel::Legacy),
            "23" => Ok(SensorModel::AvantiGoniometer),
            other => Err(Error::Protocol(format!("unknown sensor type code {other:?}"))),
        }
    }

    /// Code the device reports for this model, inverse of [`from_type_code`](Self::from_type_code)
    pub fn type_code(&self) -> &'static str {
        match self {
            SensorModel::Avanti => "O",
            SensorModel::Legacy => "A",
            SensorModel::AvantiGoniometer => "23",
        }
    }

    pub fn family(&self) -> SensorFamily {
        match self {
            SensorModel::Avanti | SensorModel::AvantiGoniometer => SensorFamily::Avanti,
            SensorModel::Legacy => SensorFamily::Legacy,
        }
    }
}

/// Everything the device reports about one paired sensor slot
#[derive(Debug, Clone, PartialEq)]
pub struct SensorDescriptor {
    /// Pairing slot, 1-based
    pub index: u8,
    pub paired: bool,
    pub model: SensorModel,
    /// EMG rows this sensor occupies in its family's EMG frame
    pub emg_channels: usize,
    /// AUX rows this sensor occupies in its family's AUX frame
    pub aux_channels: usize,
    /// Slot position within the frame layout
    pub start_index: usize,
    /// Acquisition mode number as reported, verbatim
    pub mode: String,
}

impl SensorDescriptor {
    pub fn family(&self) -> SensorFamily {
        self.model.family()
    }

    /// Row range in the family EMG frame: `[start, start + emg_channels)`
    pub fn emg_range(&self) -> Range<usize> {
        self.start_index..self.start_index + self.emg_channels
    }

    /// Row range in the family AUX frame. AUX rows are strided: each slot
    /// reserves [`AUX_SLOT_STRIDE`] rows regardless of how many it uses.
    pub fn aux_range(&self) -> Range<usize> {
        let lo = self.start_index * AUX_SLOT_STRIDE;
        lo..lo + self.aux_channels
    }

    /// Row range for one signal kind
    pub fn range(&self, signal: SignalKind) -> Range<usize> {
        match signal {
            SignalKind::Emg => self.emg_range(),
            SignalKind::Aux => self.aux_range(),
        }
    }
}

/// One paired sensor plus its owned sample history
#[derive(Debug)]
pub struct SensorEntry {
    pub descriptor: SensorDescriptor,
    pub emg: SampleRing,
    pub aux: SampleRing,
}

impl SensorEntry {
    pub fn ring(&self, signal: SignalKind) -> &SampleRing {
        match signal {
            SignalKind::Emg => &self.emg,
            SignalKind::Aux => &self.aux,
        }
    }

    pub fn ring_mut(&mut self, signal: SignalKind) -> &mut SampleRing {
        match signal {
            SignalKind::Emg => &mut self.emg,
            SignalKind::Aux => &mut self.aux,
        }
    }
}

/// Owner of all paired sensors and their ring buffers
#[derive(Debug)]
pub struct SensorRegistry {
    entries: Vec<SensorEntry>,
}

impl SensorRegistry {
    /// Build a registry from known descriptors, allocating rings of
    /// `ring_capacity` chunks each. Unpaired descriptors are dropped here, so
    /// the registry only ever holds paired sensors.
    pub fn from_descriptors(descriptors: Vec<SensorDescriptor>, ring_capacity: usize) -> Self {
        let entries = descriptors
            .into_iter()
            .filter(|descriptor| descriptor.paired)
            .map(|descriptor| SensorEntry {
                descriptor,
                emg: SampleRing::new(ring_capacity),
                aux: SampleRing::new(ring_capacity),
            })
            .collect();
        Self { entries }
    }

    /// Interrogate all 16 slots and build the registry of paired sensors
    pub fn discover(control: &mut ControlChannel, ring_capacity: usize) -> Result<Self> {
        let mut descriptors = Vec::new();
        for n in 1..=SENSOR_SLOTS {
            if !control.is_paired(n)? {
                log::debug!("sensor slot {n}: unpaired");
                continue;
            }
            let code = control.sensor_type_code(n)?;
            let model = SensorModel::from_type_code(&code)?;
            let descriptor = SensorDescriptor {
                index: n,
                paired: true,
                model,
                emg_channels: control.emg_channel_count(n)?,
                aux_channels: control.aux_channel_count(n)?,
                start_index: control.start_index(n)?,
                mode: control.sensor_mode(n)?,
            };
            log::info!(
                "sensor {}: {:?} mode {} ({} emg rows from {}, {} aux rows from {})",
                n,
                model,
                descriptor.mode,
                descriptor.emg_channels,
                descriptor.emg_range().start,
                descriptor.aux_channels,
                descriptor.aux_range().start,
            );
            descriptors.push(descriptor);
        }
        if descriptors.is_empty() {
            log::warn!("no paired sensors found");
        }
        Ok(Self::from_descriptors(descriptors, ring_capacity))
    }

    /// Stream kinds that actually carry data for this sensor set
    ///
    /// A kind is active when some paired sensor of its family uses at least
    /// one channel of its signal; families with no paired sensors get no
    /// reader at all.
    pub fn active_kinds(&self) -> Vec<StreamKind> {
        StreamKind::ALL
            .into_iter()
            .filter(|kind| {
                self.entries.iter().any(|e| {
                    e.descriptor.family() == kind.family()
                        && !e.descriptor.range(kind.signal()).is_empty()
                })
            })
            .collect()
    }

    pub fn entries(&self) -> &[SensorEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [SensorEntry] {
        &mut self.entries
    }

    /// Entry for a pairing slot, if that slot is paired
    pub fn sensor(&self, index: u8) -> Option<&SensorEntry> {
        self.entries.iter().find(|e| e.descriptor.index == index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use std::time::Duration;

    fn descriptor(
        index: u8,
        model: SensorModel,
        emg: usize,
        aux: usize,
        start: usize,
    ) -> SensorDescriptor {
        SensorDescriptor {
            index,
            paired: true,
            model,
            emg_channels: emg,
            aux_channels: aux,
            start_index: start,
            mode: "0".to_string(),
        }
    }

    #[test]
    fn test_type_code_parse() {
        assert_eq!(SensorModel::from_type_code("O").unwrap(), SensorModel::Avanti);
        assert_eq!(SensorModel::from_type_code("A").unwrap(), SensorModel::Legacy);
        assert_eq!(
            SensorModel::from_type_code("23").unwrap(),
            SensorModel::AvantiGoniometer
        );
        assert!(SensorModel::from_type_code("X").is_err());
    }

    #[test]
    fn test_type_code_round_trip() {
        for model in [
            SensorModel::Avanti,
            SensorModel::Legacy,
            SensorModel::AvantiGoniometer,
        ] {
            assert_eq!(SensorModel::from_type_code(model.type_code()).unwrap(), model);
        }
    }

    #[test]
    fn test_goniometer_is_avanti_family() {
        assert_eq!(
            SensorModel::AvantiGoniometer.family(),
            SensorFamily::Avanti
        );
    }

    #[test]
    fn test_channel_ranges() {
        let d = descriptor(1, SensorModel::Avanti, 4, 9, 4);
        assert_eq!(d.emg_range(), 4..8);
        // aux rows are strided by 9 per slot
        assert_eq!(d.aux_range(), 36..45);

        let d2 = descriptor(2, SensorModel::Legacy, 1, 3, 2);
        assert_eq!(d2.emg_range(), 2..3);
        assert_eq!(d2.aux_range(), 18..21);
    }

    #[test]
    fn test_active_kinds_by_family_and_usage() {
        let registry = SensorRegistry::from_descriptors(
            vec![
                descriptor(1, SensorModel::Avanti, 1, 9, 0),
                // legacy sensor with no aux channels
                descriptor(2, SensorModel::Legacy, 1, 0, 1),
            ],
            4,
        );
        assert_eq!(
            registry.active_kinds(),
            vec![
                StreamKind::AvantiEmg,
                StreamKind::AvantiAux,
                StreamKind::LegacyEmg
            ]
        );
    }

    #[test]
    fn test_no_sensors_no_kinds() {
        let registry = SensorRegistry::from_descriptors(vec![], 4);
        assert!(registry.active_kinds().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unpaired_descriptors_are_dropped() {
        let mut unpaired = descriptor(1, SensorModel::Avanti, 4, 0, 0);
        unpaired.paired = false;
        let registry = SensorRegistry::from_descriptors(
            vec![unpaired, descriptor(2, SensorModel::Legacy, 1, 0, 1)],
            4,
        );

        assert_eq!(registry.len(), 1);
        assert!(registry.sensor(1).is_none());
        // the unpaired Avanti sensor must not activate its family's kinds
        assert_eq!(registry.active_kinds(), vec![StreamKind::LegacyEmg]);
    }

    #[test]
    fn test_discovery_over_scripted_channel() {
        let mock = MockTransport::new();
        // slot 1 paired goniometer, slots 2-16 unpaired
        let mut script = String::from("YES\r\n\r\n23\r\n\r\n2\r\n\r\n6\r\n\r\n0\r\n\r\n362\r\n\r\n");
        for _ in 2..=16 {
            script.push_str("NO\r\n\r\n");
        }
        mock.inject_read(script.as_bytes());

        let mut control =
            ControlChannel::new(Box::new(mock.clone()), Duration::from_millis(100), false);
        let registry = SensorRegistry::discover(&mut control, 8).unwrap();

        assert_eq!(registry.len(), 1);
        let entry = registry.sensor(1).unwrap();
        assert_eq!(entry.descriptor.model, SensorModel::AvantiGoniometer);
        assert_eq!(entry.descriptor.emg_range(), 0..2);
        assert_eq!(entry.descriptor.aux_range(), 0..6);
        assert_eq!(entry.descriptor.mode, "362");
        assert_eq!(entry.emg.capacity(), 8);
        assert_eq!(
            registry.active_kinds(),
            vec![StreamKind::AvantiEmg, StreamKind::AvantiAux]
        );

        // the scan asked about every slot
        let written = String::from_utf8(mock.get_written()).unwrap();
        assert!(written.contains("SENSOR 1 TYPE?"));
        assert!(written.contains("SENSOR 16 PAIRED?"));
        assert!(!written.contains("SENSOR 2 TYPE?"));
    }
}
