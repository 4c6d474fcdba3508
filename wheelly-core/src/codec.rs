//! codec.rs — Compact binary codec for streaming snapshots
//!
//! Primitive contracts (big-endian where byte order applies):
//! - bool: 1 byte, 0 or 1
//! - float/double: IEEE-754 bits, bit-exact round trip (NaN payloads, ±0, ±∞)
//! - int/long/short: sign-folded base-128 varint. The first byte carries the
//!   sign and 6 magnitude bits, continuation bytes 7 bits each, MSB =
//!   continuation. Hence size(0)=1, size(±64)=2, size(±8192)=3 and
//!   size(i64::MIN)=10.
//! - string: varint byte-length prefix, then UTF-8
//!
//! Records encode field by field on top of the primitives; cell locations
//! and vertex tables are derived from the topology on read-back rather than
//! stored.

use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};

use wheelly_types::{
    CameraMessage, Complex, ContactsMessage, GridTopology, LidarMessage, MotionMessage, Point,
    ProxyMessage, RobotSpec, RobotStatus, SupplyMessage,
};

use crate::controller::RobotCommand;
use crate::error::CodecError;
use crate::map_cell::MapCell;
use crate::marker::{CorrelatedCameraEvent, LabelMarker};
use crate::polar_map::{PolarMap, PolarSector, SectorStatus};
use crate::radar_map::RadarMap;
use crate::world::WorldModel;

// ── Writer ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct DataFileWriter {
    buf: BytesMut,
}

impl DataFileWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.put_u8(v as u8);
    }

    pub fn write_float(&mut self, v: f32) {
        self.buf.put_u32(v.to_bits());
    }

    pub fn write_double(&mut self, v: f64) {
        self.buf.put_u64(v.to_bits());
    }

    pub fn write_long(&mut self, v: i64) {
        let sign = v < 0;
        let magnitude = v.unsigned_abs();
        let mut first = ((sign as u8) << 6) | (magnitude & 0x3F) as u8;
        let mut rest = magnitude >> 6;
        if rest != 0 {
            first |= 0x80;
        }
        self.buf.put_u8(first);
        while rest != 0 {
            let mut byte = (rest & 0x7F) as u8;
            rest >>= 7;
            if rest != 0 {
                byte |= 0x80;
            }
            self.buf.put_u8(byte);
        }
    }

    pub fn write_int(&mut self, v: i32) {
        self.write_long(v as i64);
    }

    pub fn write_short(&mut self, v: i16) {
        self.write_long(v as i64);
    }

    pub fn write_unsigned(&mut self, v: u64) {
        // clocks and counters fit i64 by construction
        self.write_long(v as i64);
    }

    pub fn write_string(&mut self, v: &str) {
        self.write_long(v.len() as i64);
        self.buf.put_slice(v.as_bytes());
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct DataFileReader {
    data: Bytes,
    pos: usize,
}

impl DataFileReader {
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes already read.
    pub fn size(&self) -> usize {
        self.pos
    }

    /// Reposition at offset 0.
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    fn take(&mut self, n: usize) -> Result<&[u8], CodecError> {
        if self.pos + n > self.data.len() {
            return Err(CodecError::UnexpectedEof(self.pos));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn byte(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        match self.byte()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidBool(other)),
        }
    }

    pub fn read_float(&mut self) -> Result<f32, CodecError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().expect("sized slice");
        Ok(f32::from_bits(u32::from_be_bytes(bytes)))
    }

    pub fn read_double(&mut self) -> Result<f64, CodecError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().expect("sized slice");
        Ok(f64::from_bits(u64::from_be_bytes(bytes)))
    }

    pub fn read_long(&mut self) -> Result<i64, CodecError> {
        let first = self.byte()?;
        let sign = first & 0x40 != 0;
        let mut magnitude = (first & 0x3F) as u64;
        let mut shift = 6u32;
        let mut more = first & 0x80 != 0;
        while more {
            let byte = self.byte()?;
            more = byte & 0x80 != 0;
            let part = (byte & 0x7F) as u64;
            let lost_bits = shift >= 64 || (part << shift) >> shift != part;
            if lost_bits && part != 0 {
                return Err(CodecError::Overflow {
                    kind: "long",
                    value: part as i64,
                });
            }
            if shift < 64 {
                magnitude |= part << shift;
            }
            shift += 7;
        }
        if sign {
            if magnitude > 1u64 << 63 {
                return Err(CodecError::Overflow {
                    kind: "long",
                    value: magnitude as i64,
                });
            }
            Ok((magnitude as i64).wrapping_neg())
        } else if magnitude > i64::MAX as u64 {
            Err(CodecError::Overflow {
                kind: "long",
                value: magnitude as i64,
            })
        } else {
            Ok(magnitude as i64)
        }
    }

    pub fn read_int(&mut self) -> Result<i32, CodecError> {
        let v = self.read_long()?;
        i32::try_from(v).map_err(|_| CodecError::Overflow {
            kind: "int",
            value: v,
        })
    }

    pub fn read_short(&mut self) -> Result<i16, CodecError> {
        let v = self.read_long()?;
        i16::try_from(v).map_err(|_| CodecError::Overflow {
            kind: "short",
            value: v,
        })
    }

    pub fn read_unsigned(&mut self) -> Result<u64, CodecError> {
        let v = self.read_long()?;
        u64::try_from(v).map_err(|_| CodecError::Overflow {
            kind: "unsigned",
            value: v,
        })
    }

    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_long()?;
        let len = usize::try_from(len).map_err(|_| CodecError::Overflow {
            kind: "string length",
            value: len,
        })?;
        let bytes = self.take(len)?.to_vec();
        String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
    }
}

// ── Geometry records ──────────────────────────────────────────────────────────

pub fn write_point(w: &mut DataFileWriter, p: Point) {
    w.write_double(p.x);
    w.write_double(p.y);
}

pub fn read_point(r: &mut DataFileReader) -> Result<Point, CodecError> {
    Ok(Point::new(r.read_double()?, r.read_double()?))
}

fn write_complex(w: &mut DataFileWriter, c: Complex) {
    w.write_double(c.x());
    w.write_double(c.y());
}

fn read_complex(r: &mut DataFileReader) -> Result<Complex, CodecError> {
    let x = r.read_double()?;
    let y = r.read_double()?;
    Ok(Complex::from_point(Point::new(x, y)))
}

pub fn write_topology(w: &mut DataFileWriter, t: &GridTopology) {
    write_point(w, t.center());
    w.write_long(t.width() as i64);
    w.write_long(t.height() as i64);
    w.write_double(t.grid_size());
}

pub fn read_topology(r: &mut DataFileReader) -> Result<GridTopology, CodecError> {
    let center = read_point(r)?;
    let width = r.read_unsigned()? as usize;
    let height = r.read_unsigned()? as usize;
    let grid_size = r.read_double()?;
    Ok(GridTopology::new(center, width, height, grid_size))
}

pub fn write_spec(w: &mut DataFileWriter, spec: &RobotSpec) {
    w.write_double(spec.max_radar_distance);
    w.write_double(spec.receptive_angle_deg);
    w.write_double(spec.contact_radius);
    w.write_double(spec.marker_size);
}

pub fn read_spec(r: &mut DataFileReader) -> Result<RobotSpec, CodecError> {
    Ok(RobotSpec {
        max_radar_distance: r.read_double()?,
        receptive_angle_deg: r.read_double()?,
        contact_radius: r.read_double()?,
        marker_size: r.read_double()?,
    })
}

// ── Map records ───────────────────────────────────────────────────────────────

fn write_map_cell(w: &mut DataFileWriter, cell: &MapCell) {
    // location is derived from the topology on read-back
    w.write_unsigned(cell.echo_time);
    w.write_double(cell.echo_weight);
    w.write_unsigned(cell.contact_time);
    w.write_unsigned(cell.labeled_time);
    w.write_double(cell.labeled_weight);
}

fn read_map_cell(r: &mut DataFileReader, location: Point) -> Result<MapCell, CodecError> {
    Ok(MapCell {
        location,
        echo_time: r.read_unsigned()?,
        echo_weight: r.read_double()?,
        contact_time: r.read_unsigned()?,
        labeled_time: r.read_unsigned()?,
        labeled_weight: r.read_double()?,
    })
}

pub fn write_radar_map(w: &mut DataFileWriter, map: &RadarMap) {
    write_topology(w, map.topology());
    w.write_unsigned(map.clean_timestamp());
    for cell in map.cells() {
        write_map_cell(w, cell);
    }
}

pub fn read_radar_map(r: &mut DataFileReader) -> Result<RadarMap, CodecError> {
    let topology = read_topology(r)?;
    let clean_timestamp = r.read_unsigned()?;
    let cells = (0..topology.area())
        .map(|idx| read_map_cell(r, topology.location(idx)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RadarMap::with_cells(topology, cells, clean_timestamp))
}

pub fn write_polar_map(w: &mut DataFileWriter, map: &PolarMap) {
    write_point(w, map.center());
    write_complex(w, map.direction());
    w.write_long(map.sectors().len() as i64);
    for sector in map.sectors() {
        let tag = match sector.status {
            SectorStatus::Unknown => 0,
            SectorStatus::Empty => 1,
            SectorStatus::Hindered => 2,
        };
        w.write_long(tag);
        w.write_bool(sector.obstacle.is_some());
        if let Some(p) = sector.obstacle {
            write_point(w, p);
        }
        w.write_double(sector.distance);
    }
}

pub fn read_polar_map(r: &mut DataFileReader) -> Result<PolarMap, CodecError> {
    let center = read_point(r)?;
    let direction = read_complex(r)?;
    let n = r.read_unsigned()? as usize;
    let mut sectors = Vec::with_capacity(n);
    for _ in 0..n {
        let status = match r.read_long()? {
            0 => SectorStatus::Unknown,
            1 => SectorStatus::Empty,
            2 => SectorStatus::Hindered,
            other => return Err(CodecError::InvalidTag(other as u8)),
        };
        let obstacle = if r.read_bool()? {
            Some(read_point(r)?)
        } else {
            None
        };
        let distance = r.read_double()?;
        sectors.push(PolarSector {
            status,
            obstacle,
            distance,
        });
    }
    Ok(PolarMap::from_parts(center, direction, sectors))
}

// ── Marker records ────────────────────────────────────────────────────────────

pub fn write_marker(w: &mut DataFileWriter, marker: &LabelMarker) {
    w.write_string(&marker.label);
    write_point(w, marker.location);
    w.write_double(marker.weight);
    w.write_unsigned(marker.marker_time);
    w.write_unsigned(marker.clean_time);
}

pub fn read_marker(r: &mut DataFileReader) -> Result<LabelMarker, CodecError> {
    Ok(LabelMarker {
        label: r.read_string()?,
        location: read_point(r)?,
        weight: r.read_double()?,
        marker_time: r.read_unsigned()?,
        clean_time: r.read_unsigned()?,
    })
}

pub fn write_markers(w: &mut DataFileWriter, markers: &HashMap<String, LabelMarker>) {
    let mut labels: Vec<&String> = markers.keys().collect();
    labels.sort();
    w.write_long(labels.len() as i64);
    for label in labels {
        write_marker(w, &markers[label]);
    }
}

pub fn read_markers(r: &mut DataFileReader) -> Result<HashMap<String, LabelMarker>, CodecError> {
    let n = r.read_unsigned()? as usize;
    let mut out = HashMap::with_capacity(n);
    for _ in 0..n {
        let marker = read_marker(r)?;
        out.insert(marker.label.clone(), marker);
    }
    Ok(out)
}

// ── Message records ───────────────────────────────────────────────────────────

pub fn write_motion(w: &mut DataFileWriter, m: &MotionMessage) {
    w.write_unsigned(m.simulation_time);
    w.write_double(m.x_pulses);
    w.write_double(m.y_pulses);
    w.write_int(m.direction_deg);
    w.write_double(m.left_pps);
    w.write_double(m.right_pps);
    w.write_int(m.imu_failure);
    w.write_bool(m.can_move);
    w.write_int(m.left_power);
    w.write_int(m.right_power);
    w.write_double(m.left_target_pps);
    w.write_double(m.right_target_pps);
}

pub fn read_motion(r: &mut DataFileReader) -> Result<MotionMessage, CodecError> {
    Ok(MotionMessage {
        simulation_time: r.read_unsigned()?,
        x_pulses: r.read_double()?,
        y_pulses: r.read_double()?,
        direction_deg: r.read_int()?,
        left_pps: r.read_double()?,
        right_pps: r.read_double()?,
        imu_failure: r.read_int()?,
        can_move: r.read_bool()?,
        left_power: r.read_int()?,
        right_power: r.read_int()?,
        left_target_pps: r.read_double()?,
        right_target_pps: r.read_double()?,
    })
}

pub fn write_proxy(w: &mut DataFileWriter, m: &ProxyMessage) {
    w.write_unsigned(m.simulation_time);
    w.write_int(m.sensor_direction_deg);
    w.write_unsigned(m.echo_delay_us);
    w.write_double(m.x_pulses);
    w.write_double(m.y_pulses);
    w.write_int(m.direction_deg);
}

pub fn read_proxy(r: &mut DataFileReader) -> Result<ProxyMessage, CodecError> {
    Ok(ProxyMessage {
        simulation_time: r.read_unsigned()?,
        sensor_direction_deg: r.read_int()?,
        echo_delay_us: r.read_unsigned()?,
        x_pulses: r.read_double()?,
        y_pulses: r.read_double()?,
        direction_deg: r.read_int()?,
    })
}

pub fn write_lidar(w: &mut DataFileWriter, m: &LidarMessage) {
    w.write_unsigned(m.simulation_time);
    w.write_long(m.front_mm as i64);
    w.write_long(m.rear_mm as i64);
    w.write_double(m.x_pulses);
    w.write_double(m.y_pulses);
    w.write_int(m.yaw_deg);
    w.write_int(m.head_deg);
}

pub fn read_lidar(r: &mut DataFileReader) -> Result<LidarMessage, CodecError> {
    Ok(LidarMessage {
        simulation_time: r.read_unsigned()?,
        front_mm: r.read_unsigned()? as u32,
        rear_mm: r.read_unsigned()? as u32,
        x_pulses: r.read_double()?,
        y_pulses: r.read_double()?,
        yaw_deg: r.read_int()?,
        head_deg: r.read_int()?,
    })
}

pub fn write_contacts(w: &mut DataFileWriter, m: &ContactsMessage) {
    w.write_unsigned(m.simulation_time);
    w.write_bool(m.front);
    w.write_bool(m.rear);
    w.write_bool(m.can_move_forward);
    w.write_bool(m.can_move_backward);
}

pub fn read_contacts(r: &mut DataFileReader) -> Result<ContactsMessage, CodecError> {
    Ok(ContactsMessage {
        simulation_time: r.read_unsigned()?,
        front: r.read_bool()?,
        rear: r.read_bool()?,
        can_move_forward: r.read_bool()?,
        can_move_backward: r.read_bool()?,
    })
}

pub fn write_supply(w: &mut DataFileWriter, m: &SupplyMessage) {
    w.write_unsigned(m.simulation_time);
    w.write_long(m.voltage_mv as i64);
}

pub fn read_supply(r: &mut DataFileReader) -> Result<SupplyMessage, CodecError> {
    Ok(SupplyMessage {
        simulation_time: r.read_unsigned()?,
        voltage_mv: r.read_unsigned()? as u32,
    })
}

pub fn write_camera(w: &mut DataFileWriter, m: &CameraMessage) {
    w.write_unsigned(m.camera_time);
    w.write_string(&m.label);
    w.write_int(m.direction_deg);
    w.write_int(m.width);
    w.write_int(m.height);
}

pub fn read_camera(r: &mut DataFileReader) -> Result<CameraMessage, CodecError> {
    Ok(CameraMessage {
        camera_time: r.read_unsigned()?,
        label: r.read_string()?,
        direction_deg: r.read_int()?,
        width: r.read_int()?,
        height: r.read_int()?,
    })
}

pub fn write_camera_event(w: &mut DataFileWriter, event: &CorrelatedCameraEvent) {
    write_camera(w, &event.camera);
    write_proxy(w, &event.proxy);
}

pub fn read_camera_event(r: &mut DataFileReader) -> Result<CorrelatedCameraEvent, CodecError> {
    Ok(CorrelatedCameraEvent {
        camera: read_camera(r)?,
        proxy: read_proxy(r)?,
    })
}

fn write_option<T>(
    w: &mut DataFileWriter,
    value: &Option<T>,
    write: impl Fn(&mut DataFileWriter, &T),
) {
    w.write_bool(value.is_some());
    if let Some(v) = value {
        write(w, v);
    }
}

fn read_option<T>(
    r: &mut DataFileReader,
    read: impl Fn(&mut DataFileReader) -> Result<T, CodecError>,
) -> Result<Option<T>, CodecError> {
    if r.read_bool()? {
        Ok(Some(read(r)?))
    } else {
        Ok(None)
    }
}

pub fn write_robot_status(w: &mut DataFileWriter, status: &RobotStatus) {
    write_spec(w, &status.spec);
    w.write_unsigned(status.simulation_time);
    write_option(w, &status.motion, |w, m| write_motion(w, m));
    write_option(w, &status.proxy, |w, m| write_proxy(w, m));
    write_option(w, &status.lidar, |w, m| write_lidar(w, m));
    write_option(w, &status.contacts, |w, m| write_contacts(w, m));
    write_option(w, &status.supply, |w, m| write_supply(w, m));
    write_option(w, &status.camera, |w, m| write_camera(w, m));
}

pub fn read_robot_status(r: &mut DataFileReader) -> Result<RobotStatus, CodecError> {
    let spec = read_spec(r)?;
    let simulation_time = r.read_unsigned()?;
    let mut status = RobotStatus::new(spec);
    status.simulation_time = simulation_time;
    status.motion = read_option(r, read_motion)?;
    status.proxy = read_option(r, read_proxy)?;
    status.lidar = read_option(r, read_lidar)?;
    status.contacts = read_option(r, read_contacts)?;
    status.supply = read_option(r, read_supply)?;
    status.camera = read_option(r, read_camera)?;
    Ok(status)
}

// ── Command records ───────────────────────────────────────────────────────────

pub fn write_command(w: &mut DataFileWriter, command: &RobotCommand) {
    match command {
        RobotCommand::Move { direction, speed } => {
            w.write_long(0);
            write_complex(w, *direction);
            w.write_int(*speed);
        }
        RobotCommand::Scan { direction } => {
            w.write_long(1);
            write_complex(w, *direction);
        }
        RobotCommand::Halt => w.write_long(2),
    }
}

pub fn read_command(r: &mut DataFileReader) -> Result<RobotCommand, CodecError> {
    match r.read_long()? {
        0 => Ok(RobotCommand::Move {
            direction: read_complex(r)?,
            speed: r.read_int()?,
        }),
        1 => Ok(RobotCommand::Scan {
            direction: read_complex(r)?,
        }),
        2 => Ok(RobotCommand::Halt),
        other => Err(CodecError::InvalidTag(other as u8)),
    }
}

// ── World model record ────────────────────────────────────────────────────────

pub fn write_world_model(w: &mut DataFileWriter, model: &WorldModel) {
    write_spec(w, &model.spec);
    write_robot_status(w, &model.robot_status);
    write_radar_map(w, &model.radar_map);
    write_markers(w, &model.markers);
    write_polar_map(w, &model.polar_map);
    write_radar_map(w, &model.grid_map);
    w.write_long(model.safe_points.len() as i64);
    for p in &model.safe_points {
        write_point(w, *p);
    }
}

pub fn read_world_model(r: &mut DataFileReader) -> Result<WorldModel, CodecError> {
    let spec = read_spec(r)?;
    let robot_status = read_robot_status(r)?;
    let radar_map = read_radar_map(r)?;
    let markers = read_markers(r)?;
    let polar_map = read_polar_map(r)?;
    let grid_map = read_radar_map(r)?;
    let n = r.read_unsigned()? as usize;
    let mut safe_points = Vec::with_capacity(n);
    for _ in 0..n {
        safe_points.push(read_point(r)?);
    }
    Ok(WorldModel {
        spec,
        robot_status,
        radar_map,
        markers,
        polar_map,
        grid_map,
        safe_points,
    })
}
