//! Fake controller on a loopback UDP socket
//!
//! Answers PING, READ_STATUS, READ_CODE, READ_RANDOM and WRITE_RANDOM the
//! way a running controller with a loaded program does.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes};
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use zip::write::SimpleFileOptions;

use scgisrv::abus::{AbusMessage, Command, CommandFrame, Direction};
use scgisrv::utils::text::latin1_encode;

pub const ALC: &str = "\
; test program
0100  00001 1     0      1    global bit   lc00_qx00   Digital output 0
0200  00002 1     0      2    global int   counter   Event counter
0300  00003 1     0      4    global real  temperature   Temperatur \u{b0}C
";

pub const CODE_CRC: u16 = 0x4d2;

const HEAD_ADDR: usize = 0x20000;
const TABLE_ADDR: usize = 0x20100;
const ALC_ADDR: usize = 0x21000;
const FILE_NAME_LEN: usize = 32;

pub struct UdpPlc {
    pub nad: u32,
    pub addr: SocketAddr,
    code: Vec<u8>,
    data: Mutex<Vec<u8>>,
    requests: AtomicUsize,
    silent: AtomicBool,
}

impl UdpPlc {
    pub async fn start(nad: u32, cancel: CancellationToken) -> Arc<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let plc = Arc::new(Self {
            nad,
            addr: socket.local_addr().unwrap(),
            code: program(),
            data: Mutex::new(vec![0u8; 0x10000]),
            requests: AtomicUsize::new(0),
            silent: AtomicBool::new(false),
        });

        let this = plc.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            loop {
                let (n, from) = tokio::select! {
                    received = socket.recv_from(&mut buf) => received.unwrap(),
                    _ = cancel.cancelled() => break,
                };
                let Ok(request) = AbusMessage::from_bytes(&buf[..n], from) else {
                    continue;
                };
                if request.to_nad != this.nad {
                    continue;
                }
                this.requests.fetch_add(1, Ordering::SeqCst);
                if this.silent.load(Ordering::SeqCst) {
                    continue;
                }
                let Some(body) = this.respond(&request.frame.body) else {
                    continue;
                };
                let reply = AbusMessage::new(
                    from,
                    request.to_nad,
                    request.from_nad,
                    request.transaction_id,
                    CommandFrame::new(Direction::Ack, 0, Bytes::from(body)),
                );
                socket.send_to(&reply.to_bytes().unwrap(), from).await.unwrap();
            }
        });
        plc
    }

    pub fn set_data(&self, addr: usize, bytes: &[u8]) {
        self.data.lock()[addr..addr + bytes.len()].copy_from_slice(bytes);
    }

    pub fn data(&self, addr: usize, len: usize) -> Vec<u8> {
        self.data.lock()[addr..addr + len].to_vec()
    }

    /// Swallow requests without answering
    pub fn set_silent(&self, silent: bool) {
        self.silent.store(silent, Ordering::SeqCst);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn respond(&self, body: &[u8]) -> Option<Vec<u8>> {
        let (&opcode, mut rest) = body.split_first()?;
        match opcode {
            op if op == Command::Ping as u8 || op == Command::WriteData as u8 => Some(Vec::new()),
            op if op == Command::ReadStatus as u8 => Some(vec![1, 2]),
            op if op == Command::ReadCode as u8 => {
                let start = rest.get_u16_le() as usize * 256;
                let size = rest.get_u16_le() as usize;
                self.code.get(start..start + size).map(<[u8]>::to_vec)
            },
            op if op == Command::ReadRandom as u8 => {
                let counts = [rest.get_u16_le(), rest.get_u16_le(), rest.get_u16_le()];
                let data = self.data.lock();
                let mut out = Vec::new();
                for (count, width) in counts.iter().zip([1usize, 2, 4]) {
                    for _ in 0..*count {
                        let addr = rest.get_u16_le() as usize;
                        out.extend_from_slice(&data[addr..addr + width]);
                    }
                }
                Some(out)
            },
            op if op == Command::WriteRandom as u8 => {
                let counts = [rest.get_u16_le(), rest.get_u16_le(), rest.get_u16_le()];
                let mut targets = Vec::new();
                for (count, width) in counts.iter().zip([1usize, 2, 4]) {
                    for _ in 0..*count {
                        targets.push((rest.get_u16_le() as usize, width));
                    }
                }
                let mut data = self.data.lock();
                for (addr, width) in targets {
                    data[addr..addr + width].copy_from_slice(&rest[..width]);
                    rest.advance(width);
                }
                Some(Vec::new())
            },
            _ => None,
        }
    }
}

/// Code memory holding a program head, a two entry file table and `alc.zip`
fn program() -> Vec<u8> {
    let alc_zip = zip_alc();
    let mut code = vec![0u8; 0x30000];

    let mut head = Vec::with_capacity(0x46);
    head.put_u16_le(0);
    head.put_u16_le(31415);
    head.put_u16_le(0x1111);
    head.put_u16_le(CODE_CRC);
    head.put_u16_le(0x2222);
    head.put_u16_le(0x3333);
    head.put_u32_le(0);
    head.resize(0x40, 0);
    head.put_u32_le(TABLE_ADDR as u32);
    head.put_u16_le(2);
    code[HEAD_ADDR..HEAD_ADDR + head.len()].copy_from_slice(&head);

    let mut table = descriptor("main.bin", 0x100, 0x20);
    table.extend(descriptor("alc.zip", ALC_ADDR as u32, alc_zip.len() as u32));
    code[TABLE_ADDR..TABLE_ADDR + table.len()].copy_from_slice(&table);
    code[ALC_ADDR..ALC_ADDR + alc_zip.len()].copy_from_slice(&alc_zip);
    code
}

fn descriptor(name: &str, address: u32, size: u32) -> Vec<u8> {
    let mut data = vec![0u8; FILE_NAME_LEN];
    data[..name.len()].copy_from_slice(name.as_bytes());
    data.put_u16_le(name.len() as u16);
    data.put_u32_le(address);
    data.put_u32_le(size);
    data.put_u32_le(0);
    data
}

fn zip_alc() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file("plc.alc", SimpleFileOptions::default()).unwrap();
    writer.write_all(&latin1_encode(ALC)).unwrap();
    writer.finish().unwrap().into_inner()
}
