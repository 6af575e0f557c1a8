// ============================================
// File: crates/wiretape/tests/common/mod.rs
// ============================================
//! Builders shared by the integration tests: wire ops, TCP flows and a
//! pcap-file-to-log capture helper.

#![allow(dead_code)]

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::sync::broadcast;

use wiretape::config::CaptureConfig;
use wiretape::{CaptureSummary, OpLogReader, OpLogWriter, Recorder};
use wiretape_common::{CaptureTime, ConnectionId};
use wiretape_core::protocol::{
    encode_op, DeleteOp, GetMoreOp, MsgHeader, MsgOp, MsgSection, Op, OpCode, QueryOp,
    RawDocument, ReplyOp,
};
use wiretape_core::OpWithTime;
use wiretape_transport::capture::frame::TcpFlags;
use wiretape_transport::capture::mock::{pcap_bytes, tcp_frame};
use wiretape_transport::PcapFileSource;

pub const SERVER: &str = "10.1.0.9:27017";

pub fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

/// Capture time `ms` milliseconds into the recording.
pub fn at_ms(ms: u32) -> CaptureTime {
    CaptureTime::from_secs_micros(1_700_000_000 + ms / 1000, (ms % 1000) * 1000)
}

// ============================================
// Ops
// ============================================

fn header(op: OpCode, request_id: i32, response_to: i32) -> MsgHeader {
    MsgHeader {
        message_length: 0,
        request_id,
        response_to,
        op_code: op.as_i32(),
    }
}

/// BSON `{x: 1}`.
pub fn selector_x1() -> RawDocument {
    RawDocument::from_bytes(Bytes::from_static(&[
        0x0c, 0, 0, 0, 0x10, b'x', 0, 1, 0, 0, 0, 0,
    ]))
}

pub fn query(request_id: i32, ns: &str) -> Op {
    Op::Query(QueryOp {
        header: header(OpCode::Query, request_id, 0),
        flags: 0,
        namespace: ns.into(),
        skip: 0,
        limit: 2,
        query: selector_x1(),
        return_fields: None,
    })
}

pub fn reply(request_id: i32, response_to: i32, cursor_id: i64) -> Op {
    Op::Reply(ReplyOp {
        header: header(OpCode::Reply, request_id, response_to),
        flags: 0,
        cursor_id,
        starting_from: 0,
        documents: vec![selector_x1(), selector_x1()],
    })
}

pub fn get_more(request_id: i32, ns: &str, cursor_id: i64) -> Op {
    Op::GetMore(GetMoreOp {
        header: header(OpCode::GetMore, request_id, 0),
        reserved: 0,
        namespace: ns.into(),
        limit: 2,
        cursor_id,
    })
}

pub fn delete(request_id: i32, ns: &str) -> Op {
    Op::Delete(DeleteOp {
        header: header(OpCode::Delete, request_id, 0),
        reserved: 0,
        namespace: ns.into(),
        flags: 0,
        selector: selector_x1(),
    })
}

/// `OP_MSG` with a body and a `documents` sequence of `docs` entries.
pub fn msg(request_id: i32, response_to: i32, docs: usize) -> Op {
    let mut sections = vec![MsgSection::Body(selector_x1())];
    if docs > 0 {
        sections.push(MsgSection::Sequence {
            identifier: "documents".into(),
            documents: vec![selector_x1(); docs],
        });
    }
    Op::Msg(MsgOp {
        header: header(OpCode::Msg, request_id, response_to),
        flag_bits: 0,
        sections,
        checksum: None,
    })
}

/// A log record for `op` on `connection` at `ms` into the recording.
pub fn record(connection: u64, ms: u32, op: Op) -> OpWithTime {
    OpWithTime::new(
        op,
        at_ms(ms),
        ConnectionId::new(connection),
        addr("10.1.0.1:40000"),
        addr(SERVER),
    )
}

// ============================================
// TCP Flows
// ============================================

/// One direction of a TCP connection, producing Ethernet frames.
pub struct Flow {
    pub src: SocketAddr,
    pub dst: SocketAddr,
    pub next_seq: u32,
}

impl Flow {
    pub fn new(src: &str, dst: &str, isn: u32) -> Self {
        Self {
            src: addr(src),
            dst: addr(dst),
            next_seq: isn,
        }
    }

    pub fn syn(&mut self) -> Vec<u8> {
        let frame = tcp_frame(self.src, self.dst, self.next_seq, TcpFlags::SYN, &[]);
        self.next_seq = self.next_seq.wrapping_add(1);
        frame
    }

    /// One segment carrying `payload`, advancing the sequence number.
    pub fn data(&mut self, payload: &[u8]) -> Vec<u8> {
        let frame = tcp_frame(
            self.src,
            self.dst,
            self.next_seq,
            TcpFlags::ACK | TcpFlags::PSH,
            payload,
        );
        self.next_seq = self.next_seq.wrapping_add(payload.len() as u32);
        frame
    }

    /// Splits `payload` at `cuts` into consecutive segments.
    pub fn segments(&mut self, payload: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
        let mut bounds = vec![0];
        bounds.extend_from_slice(cuts);
        bounds.push(payload.len());
        bounds
            .windows(2)
            .map(|w| self.data(&payload[w[0]..w[1]]))
            .collect()
    }
}

pub fn wire(op: &Op) -> Bytes {
    encode_op(op)
}

// ============================================
// Capture Helper
// ============================================

/// Writes `frames` as a pcap file, records it to a log file and reads
/// the log back.
pub async fn capture(
    frames: Vec<(CaptureTime, Vec<u8>)>,
    config: CaptureConfig,
) -> (CaptureSummary, Vec<OpWithTime>) {
    let dir = tempfile::tempdir().unwrap();
    let pcap = dir.path().join("traffic.pcap");
    let log = dir.path().join("traffic.ops");
    std::fs::write(&pcap, pcap_bytes(&frames)).unwrap();

    let mut source = PcapFileSource::open(&pcap).await.unwrap();
    let writer = OpLogWriter::create(&log).await.unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let summary = Recorder::new(config)
        .run(&mut source, writer, shutdown_rx)
        .await
        .unwrap();
    drop(shutdown_tx);

    let mut reader = OpLogReader::open(&log).await.unwrap();
    let mut records = Vec::new();
    while let Some(record) = reader.next_record().await.unwrap() {
        records.push(record);
    }
    (summary, records)
}
