use super::cursor::Reader;
use super::{PacketType, WireError};
use bytes::Bytes;

/// A decoded packet originating from the radio host.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundPacket {
    Heartbeat {
        client_id: Option<String>,
        max_schema: u32,
        version: Option<String>,
        revision: Option<String>,
    },
    Status {
        client_id: Option<String>,
        frequency: u64,
        mode: Option<String>,
        dx_call: Option<String>,
        report: Option<String>,
        tx_mode: Option<String>,
        tx_enabled: bool,
        transmitting: bool,
        decoding: bool,
        rx_df: u32,
        tx_df: u32,
        de_call: Option<String>,
        de_grid: Option<String>,
        dx_grid: Option<String>,
        tx_watchdog: bool,
        sub_mode: Option<String>,
        fast_mode: bool,
        special_op_mode: u8,
        frequency_tolerance: u32,
        tr_period: u32,
        config_name: Option<String>,
        last_tx_msg: Option<String>,
        qso_progress: u32,
        tx_even: bool,
        cq_only: bool,
        gen_msg: Option<String>,
        tx_halt_clicked: bool,
        not_script: bool,
    },
    Decode {
        client_id: Option<String>,
        new: bool,
        time_ms: u32,
        snr: i32,
        delta_time: f64,
        delta_frequency: u32,
        mode: Option<String>,
        message: Option<String>,
        low_confidence: bool,
        off_air: bool,
    },
    Clear {
        client_id: Option<String>,
        window: u8,
    },
    QsoLogged {
        client_id: Option<String>,
        date_off: u64,
        time_off: u32,
        dx_call: Option<String>,
        dx_grid: Option<String>,
        dial_frequency: u64,
        mode: Option<String>,
        report_sent: Option<String>,
        report_received: Option<String>,
        tx_power: Option<String>,
        comments: Option<String>,
        name: Option<String>,
        date_on: u64,
        time_on: u32,
    },
    Close {
        client_id: Option<String>,
    },
    LoggedAdif {
        client_id: Option<String>,
        adif: Option<String>,
    },
    EnqueueDecode {
        client_id: Option<String>,
        auto_gen: bool,
        time_ms: u32,
        snr: i32,
        delta_time: f64,
        delta_frequency: u32,
        mode: Option<String>,
        message: Option<String>,
        is_dx: bool,
        modifier: bool,
    },
    /// A packet type the operator has no use for decoding (`WSPRDECODE`).
    /// Kept distinct from a parse failure: the datagram was well formed,
    /// we simply don't act on it.
    Dropped(PacketType),
}

impl InboundPacket {
    pub fn decode(datagram: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(Bytes::copy_from_slice(datagram));
        let (_schema, pkt_type_raw) = r.header()?;
        let client_id = r.qstring()?;
        let pkt_type = PacketType::from_u32(pkt_type_raw)
            .ok_or(WireError::UnknownPacketType { value: pkt_type_raw })?;

        Ok(match pkt_type {
            PacketType::Heartbeat => InboundPacket::Heartbeat {
                client_id,
                max_schema: r.u32()?,
                version: r.qstring()?,
                revision: r.qstring()?,
            },
            PacketType::Status => InboundPacket::Status {
                client_id,
                frequency: r.u64()?,
                mode: r.qstring()?,
                dx_call: r.qstring()?,
                report: r.qstring()?,
                tx_mode: r.qstring()?,
                tx_enabled: r.boolean()?,
                transmitting: r.boolean()?,
                decoding: r.boolean()?,
                rx_df: r.u32()?,
                tx_df: r.u32()?,
                de_call: r.qstring()?,
                de_grid: r.qstring()?,
                dx_grid: r.qstring()?,
                tx_watchdog: r.boolean()?,
                sub_mode: r.qstring()?,
                fast_mode: r.boolean()?,
                special_op_mode: r.byte()?,
                frequency_tolerance: r.u32()?,
                tr_period: r.u32()?,
                config_name: r.qstring()?,
                last_tx_msg: r.qstring()?,
                qso_progress: r.u32()?,
                tx_even: r.boolean()?,
                cq_only: r.boolean()?,
                gen_msg: r.qstring()?,
                tx_halt_clicked: r.boolean()?,
                not_script: r.boolean()?,
            },
            PacketType::Decode => InboundPacket::Decode {
                client_id,
                new: r.boolean()?,
                time_ms: r.u32()?,
                snr: r.i32()?,
                delta_time: round3(r.f64()?),
                delta_frequency: r.u32()?,
                mode: r.qstring()?,
                message: r.qstring()?,
                low_confidence: r.boolean()?,
                off_air: r.boolean()?,
            },
            PacketType::Clear => InboundPacket::Clear { client_id, window: r.byte()? },
            PacketType::QsoLogged => {
                let (date_off, time_off, _spec, _off) = r.datetime()?;
                let dx_call = r.qstring()?;
                let dx_grid = r.qstring()?;
                let dial_frequency = r.u64()?;
                let mode = r.qstring()?;
                let report_sent = r.qstring()?;
                let report_received = r.qstring()?;
                let tx_power = r.qstring()?;
                let comments = r.qstring()?;
                let name = r.qstring()?;
                let (date_on, time_on, _spec2, _off2) = r.datetime()?;
                InboundPacket::QsoLogged {
                    client_id,
                    date_off,
                    time_off,
                    dx_call,
                    dx_grid,
                    dial_frequency,
                    mode,
                    report_sent,
                    report_received,
                    tx_power,
                    comments,
                    name,
                    date_on,
                    time_on,
                }
            }
            PacketType::Close => InboundPacket::Close { client_id },
            PacketType::LoggedAdif => InboundPacket::LoggedAdif { client_id, adif: r.qstring()? },
            PacketType::EnqueueDecode => InboundPacket::EnqueueDecode {
                client_id,
                auto_gen: r.boolean()?,
                time_ms: r.u32()?,
                snr: r.i32()?,
                delta_time: round3(r.f64()?),
                delta_frequency: r.u32()?,
                mode: r.qstring()?,
                message: r.qstring()?,
                is_dx: r.boolean()?,
                modifier: r.boolean()?,
            },
            other => InboundPacket::Dropped(other),
        })
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::super::cursor::Writer;
    use super::*;

    fn heartbeat_datagram() -> Bytes {
        let mut w = Writer::new();
        w.header(PacketType::Heartbeat as u32);
        w.u32(2);
        w.qstring(Some("1.1"));
        w.qstring(Some("1a"));
        w.into_bytes()
    }

    #[test]
    fn decodes_heartbeat() {
        let pkt = InboundPacket::decode(&heartbeat_datagram()).unwrap();
        assert_eq!(
            pkt,
            InboundPacket::Heartbeat {
                client_id: Some("EBLINK".to_string()),
                max_schema: 2,
                version: Some("1.1".to_string()),
                revision: Some("1a".to_string()),
            }
        );
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = heartbeat_datagram().to_vec();
        bytes[0] = 0;
        let err = InboundPacket::decode(&bytes).unwrap_err();
        assert!(matches!(err, WireError::BadMagic { .. }));
    }

    #[test]
    fn null_qstring_round_trips_to_none() {
        let mut w = Writer::new();
        w.header(PacketType::Close as u32);
        let bytes = w.into_bytes();
        let pkt = InboundPacket::decode(&bytes).unwrap();
        assert_eq!(pkt, InboundPacket::Close { client_id: Some("EBLINK".into()) });
    }

    #[test]
    fn unsupported_packet_type_drops() {
        let mut w = Writer::new();
        w.header(PacketType::WsprDecode as u32);
        let bytes = w.into_bytes();
        let pkt = InboundPacket::decode(&bytes).unwrap();
        assert_eq!(pkt, InboundPacket::Dropped(PacketType::WsprDecode));
    }
}
