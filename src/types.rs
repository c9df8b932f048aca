//! Core data types for Cooperative Awareness Messages.

use crate::time;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CamError {
    #[error("message_id must be 2, but is {0}")]
    InvalidMessageId(i32),
    #[error("{0} is required, but was not given")]
    MissingRequiredField(CamField),
    #[error("{field} out of range: {value}")]
    ValueOutOfRange { field: CamField, value: i64 },
    #[error("Unknown CAM field: {0}")]
    UnknownField(String),
}

/// The only message id a CAM may carry.
pub const MESSAGE_ID: i32 = 2;

/// Number of fields on the wire, `message_id` included.
pub const FIELD_COUNT: usize = 22;

/// Identifier of a transmitting station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StationId(pub u32);

impl StationId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for StationId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// CAM wire fields, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CamField {
    MessageId = 0,
    StationId = 1,
    GenDeltaTimeMillis = 2,
    ContainerMask = 3,
    StationType = 4,
    Latitude = 5,
    Longitude = 6,
    SemiMajorAxisConfidence = 7,
    SemiMinorAxisConfidence = 8,
    SemiMajorOrientation = 9,
    Altitude = 10,
    Heading = 11,
    HeadingConfidence = 12,
    Speed = 13,
    SpeedConfidence = 14,
    VehicleLength = 15,
    VehicleWidth = 16,
    LongitudinalAcceleration = 17,
    LongitudinalAccelerationConfidence = 18,
    YawRate = 19,
    YawRateConfidence = 20,
    VehicleRole = 21,
}

impl CamField {
    pub const ALL: [CamField; FIELD_COUNT] = [
        Self::MessageId,
        Self::StationId,
        Self::GenDeltaTimeMillis,
        Self::ContainerMask,
        Self::StationType,
        Self::Latitude,
        Self::Longitude,
        Self::SemiMajorAxisConfidence,
        Self::SemiMinorAxisConfidence,
        Self::SemiMajorOrientation,
        Self::Altitude,
        Self::Heading,
        Self::HeadingConfidence,
        Self::Speed,
        Self::SpeedConfidence,
        Self::VehicleLength,
        Self::VehicleWidth,
        Self::LongitudinalAcceleration,
        Self::LongitudinalAccelerationConfidence,
        Self::YawRate,
        Self::YawRateConfidence,
        Self::VehicleRole,
    ];

    /// Position of the field on the wire.
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::MessageId => "message_id",
            Self::StationId => "station_id",
            Self::GenDeltaTimeMillis => "gen_delta_time_millis",
            Self::ContainerMask => "container_mask",
            Self::StationType => "station_type",
            Self::Latitude => "latitude",
            Self::Longitude => "longitude",
            Self::SemiMajorAxisConfidence => "semi_major_axis_confidence",
            Self::SemiMinorAxisConfidence => "semi_minor_axis_confidence",
            Self::SemiMajorOrientation => "semi_major_orientation",
            Self::Altitude => "altitude",
            Self::Heading => "heading",
            Self::HeadingConfidence => "heading_confidence",
            Self::Speed => "speed",
            Self::SpeedConfidence => "speed_confidence",
            Self::VehicleLength => "vehicle_length",
            Self::VehicleWidth => "vehicle_width",
            Self::LongitudinalAcceleration => "longitudinal_acceleration",
            Self::LongitudinalAccelerationConfidence => "longitudinal_acceleration_confidence",
            Self::YawRate => "yaw_rate",
            Self::YawRateConfidence => "yaw_rate_confidence",
            Self::VehicleRole => "vehicle_role",
        }
    }

    /// Value meaning "unavailable", `None` for the fields that cannot be omitted.
    pub const fn unavailable(self) -> Option<i32> {
        match self {
            Self::MessageId | Self::StationId | Self::GenDeltaTimeMillis => None,
            Self::ContainerMask => Some(0),
            Self::StationType => Some(0),
            Self::Latitude => Some(900_000_001),
            Self::Longitude => Some(1_800_000_001),
            Self::SemiMajorAxisConfidence => Some(4095),
            Self::SemiMinorAxisConfidence => Some(4095),
            Self::SemiMajorOrientation => Some(3601),
            Self::Altitude => Some(800_001),
            Self::Heading => Some(3601),
            Self::HeadingConfidence => Some(127),
            Self::Speed => Some(16383),
            Self::SpeedConfidence => Some(127),
            Self::VehicleLength => Some(1023),
            Self::VehicleWidth => Some(62),
            Self::LongitudinalAcceleration => Some(161),
            Self::LongitudinalAccelerationConfidence => Some(102),
            Self::YawRate => Some(32767),
            Self::YawRateConfidence => Some(8),
            Self::VehicleRole => Some(0),
        }
    }

    pub const fn is_optional(self) -> bool {
        self.unavailable().is_some()
    }
}

impl fmt::Display for CamField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for CamField {
    type Err = CamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.name() == s)
            .ok_or_else(|| CamError::UnknownField(s.to_string()))
    }
}

/// ETSI ITS-G5 Cooperative Awareness Message.
///
/// See ETSI EN 302 637-2 for the meaning of the fields. Omitted optional
/// fields hold their unavailable indicator, see [`CamField::unavailable`].
/// Equality and hashing only look at the wire fields, never at the derived
/// timestamp.
#[derive(Debug, Clone, Copy)]
pub struct Cam {
    station_id: StationId,
    gen_delta_time: u16,
    container_mask: i32,
    station_type: i32,
    latitude: i32,
    longitude: i32,
    semi_major_axis_confidence: i32,
    semi_minor_axis_confidence: i32,
    semi_major_orientation: i32,
    altitude: i32,
    heading: i32,
    heading_confidence: i32,
    speed: i32,
    speed_confidence: i32,
    vehicle_length: i32,
    vehicle_width: i32,
    longitudinal_acceleration: i32,
    longitudinal_acceleration_confidence: i32,
    yaw_rate: i32,
    yaw_rate_confidence: i32,
    vehicle_role: i32,
    /// ITS timestamp derived from the GDT when the message was built
    timestamp_its: u64,
}

impl Cam {
    pub fn builder() -> CamBuilder {
        CamBuilder::new()
    }

    pub const fn message_id(&self) -> i32 {
        MESSAGE_ID
    }

    pub const fn station_id(&self) -> StationId {
        self.station_id
    }

    pub const fn gen_delta_time(&self) -> u16 {
        self.gen_delta_time
    }

    /// Absolute ITS timestamp derived at construction.
    pub const fn timestamp(&self) -> u64 {
        self.timestamp_its
    }

    /// Raw wire value of a field, unavailable indicators included.
    pub fn get(&self, field: CamField) -> i32 {
        match field {
            CamField::MessageId => MESSAGE_ID,
            CamField::StationId => self.station_id.0 as i32,
            CamField::GenDeltaTimeMillis => self.gen_delta_time as i32,
            CamField::ContainerMask => self.container_mask,
            CamField::StationType => self.station_type,
            CamField::Latitude => self.latitude,
            CamField::Longitude => self.longitude,
            CamField::SemiMajorAxisConfidence => self.semi_major_axis_confidence,
            CamField::SemiMinorAxisConfidence => self.semi_minor_axis_confidence,
            CamField::SemiMajorOrientation => self.semi_major_orientation,
            CamField::Altitude => self.altitude,
            CamField::Heading => self.heading,
            CamField::HeadingConfidence => self.heading_confidence,
            CamField::Speed => self.speed,
            CamField::SpeedConfidence => self.speed_confidence,
            CamField::VehicleLength => self.vehicle_length,
            CamField::VehicleWidth => self.vehicle_width,
            CamField::LongitudinalAcceleration => self.longitudinal_acceleration,
            CamField::LongitudinalAccelerationConfidence => {
                self.longitudinal_acceleration_confidence
            }
            CamField::YawRate => self.yaw_rate,
            CamField::YawRateConfidence => self.yaw_rate_confidence,
            CamField::VehicleRole => self.vehicle_role,
        }
    }

    /// Field value, or `None` when it holds its unavailable indicator.
    pub fn available(&self, field: CamField) -> Option<i32> {
        let value = self.get(field);
        match field.unavailable() {
            Some(sentinel) if sentinel == value => None,
            _ => Some(value),
        }
    }

    /// All wire fields with their raw values, in wire order.
    pub fn fields(&self) -> impl Iterator<Item = (CamField, i32)> + '_ {
        CamField::ALL.into_iter().map(move |f| (f, self.get(f)))
    }

    pub fn wire_values(&self) -> [i32; FIELD_COUNT] {
        CamField::ALL.map(|f| self.get(f))
    }

    /// Latitude in 1e-7 degree.
    pub fn latitude(&self) -> Option<i32> {
        self.available(CamField::Latitude)
    }

    /// Longitude in 1e-7 degree.
    pub fn longitude(&self) -> Option<i32> {
        self.available(CamField::Longitude)
    }

    /// Latitude in degrees.
    pub fn latitude_deg(&self) -> Option<f64> {
        self.latitude().map(|v| v as f64 / 10_000_000.0)
    }

    /// Longitude in degrees.
    pub fn longitude_deg(&self) -> Option<f64> {
        self.longitude().map(|v| v as f64 / 10_000_000.0)
    }

    /// Altitude in centimetres.
    pub fn altitude(&self) -> Option<i32> {
        self.available(CamField::Altitude)
    }

    /// Heading in 0.1 degree.
    pub fn heading(&self) -> Option<i32> {
        self.available(CamField::Heading)
    }

    /// Speed in cm/s.
    pub fn speed(&self) -> Option<i32> {
        self.available(CamField::Speed)
    }

    pub fn station_type(&self) -> Option<i32> {
        self.available(CamField::StationType)
    }

    pub fn vehicle_length(&self) -> Option<i32> {
        self.available(CamField::VehicleLength)
    }

    pub fn vehicle_width(&self) -> Option<i32> {
        self.available(CamField::VehicleWidth)
    }

    pub fn yaw_rate(&self) -> Option<i32> {
        self.available(CamField::YawRate)
    }

    pub fn longitudinal_acceleration(&self) -> Option<i32> {
        self.available(CamField::LongitudinalAcceleration)
    }

    /// Age of the message in milliseconds, measured now.
    pub fn age(&self) -> i64 {
        self.age_at(time::now_its())
    }

    /// Age of the message at ITS timestamp `at`; negative if `at` is earlier.
    pub fn age_at(&self, at: u64) -> i64 {
        at as i64 - self.timestamp_its as i64
    }
}

impl PartialEq for Cam {
    fn eq(&self, other: &Self) -> bool {
        self.wire_values() == other.wire_values()
    }
}

impl Eq for Cam {}

impl Hash for Cam {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.wire_values().hash(state);
    }
}

impl fmt::Display for Cam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CAM{{")?;
        for (i, (field, value)) in self.fields().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", field, value)?;
        }
        write!(f, "}}")
    }
}

/// Partial set of CAM fields, turned into a [`Cam`] by [`CamBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct CamBuilder {
    values: [Option<i64>; FIELD_COUNT],
}

impl CamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_id(self, id: i8) -> Self {
        self.set(CamField::MessageId, id as i32)
    }

    pub fn station_id(mut self, id: u32) -> Self {
        self.values[CamField::StationId.index()] = Some(id as i64);
        self
    }

    pub fn gen_delta_time(self, gdt: u16) -> Self {
        self.set(CamField::GenDeltaTimeMillis, gdt as i32)
    }

    /// Latitude and longitude in 1e-7 degree.
    pub fn position(self, latitude: i32, longitude: i32) -> Self {
        self.set(CamField::Latitude, latitude)
            .set(CamField::Longitude, longitude)
    }

    pub fn set(mut self, field: CamField, value: i32) -> Self {
        self.values[field.index()] = Some(value as i64);
        self
    }

    /// Set or clear a field; `None` leaves it unavailable.
    pub fn set_opt(mut self, field: CamField, value: Option<i32>) -> Self {
        self.values[field.index()] = value.map(i64::from);
        self
    }

    /// Set a field by its wire name.
    pub fn set_named(self, name: &str, value: i32) -> Result<Self, CamError> {
        let field: CamField = name.parse()?;
        Ok(self.set(field, value))
    }

    /// Build the message, deriving its timestamp from the wall clock.
    pub fn build(self) -> Result<Cam, CamError> {
        self.build_at(time::now_its())
    }

    /// Build the message as if received at ITS timestamp `now`.
    pub fn build_at(self, now: u64) -> Result<Cam, CamError> {
        if let Some(id) = self.values[CamField::MessageId.index()] {
            if id != MESSAGE_ID as i64 {
                return Err(CamError::InvalidMessageId(id as i32));
            }
        }

        let station_id = self.values[CamField::StationId.index()]
            .ok_or(CamError::MissingRequiredField(CamField::StationId))?;
        let gdt = self.values[CamField::GenDeltaTimeMillis.index()]
            .ok_or(CamError::MissingRequiredField(CamField::GenDeltaTimeMillis))?;
        let gen_delta_time = u16::try_from(gdt).map_err(|_| CamError::ValueOutOfRange {
            field: CamField::GenDeltaTimeMillis,
            value: gdt,
        })?;

        let opt = |field: CamField| -> i32 {
            match self.values[field.index()] {
                Some(v) => v as i32,
                None => field.unavailable().unwrap_or_default(),
            }
        };

        Ok(Cam {
            station_id: StationId(station_id as u32),
            gen_delta_time,
            container_mask: opt(CamField::ContainerMask),
            station_type: opt(CamField::StationType),
            latitude: opt(CamField::Latitude),
            longitude: opt(CamField::Longitude),
            semi_major_axis_confidence: opt(CamField::SemiMajorAxisConfidence),
            semi_minor_axis_confidence: opt(CamField::SemiMinorAxisConfidence),
            semi_major_orientation: opt(CamField::SemiMajorOrientation),
            altitude: opt(CamField::Altitude),
            heading: opt(CamField::Heading),
            heading_confidence: opt(CamField::HeadingConfidence),
            speed: opt(CamField::Speed),
            speed_confidence: opt(CamField::SpeedConfidence),
            vehicle_length: opt(CamField::VehicleLength),
            vehicle_width: opt(CamField::VehicleWidth),
            longitudinal_acceleration: opt(CamField::LongitudinalAcceleration),
            longitudinal_acceleration_confidence: opt(
                CamField::LongitudinalAccelerationConfidence,
            ),
            yaw_rate: opt(CamField::YawRate),
            yaw_rate_confidence: opt(CamField::YawRateConfidence),
            vehicle_role: opt(CamField::VehicleRole),
            timestamp_its: time::its_from_gdt_at(gen_delta_time, now),
        })
    }
}
