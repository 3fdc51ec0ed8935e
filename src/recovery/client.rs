//! NodeClient — transport seam между координатором и узлами кольца.
//!
//! Координаторам нужен route table, iterator RPC и bulk-операции; всё
//! остальное (connection pooling, framing деталей реального транспорта)
//! — забота внешнего коллаборатора. Здесь trait + минимальный framed TCP
//! клиент: [op u8][len u32 LE] + payload в обе стороны, ответные стримы
//! завершаются кадром нулевой длины. Каждая операция несёт wait_timeout;
//! истечение всплывает как transient-ошибка соответствующего work unit.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use byteorder::{ByteOrder, LittleEndian};

use crate::blob::{Id, IdRange};
use crate::consts::ID_SIZE;

use super::record::{IterRecord, ITER_RECORD_SIZE};
use super::route::RouteEntry;

/// One object in flight between replicas: the stored data payload plus the
/// raw history chain blob (timestamps travel inside the chain, so replays
/// preserve them).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItem {
    pub id: Id,
    pub data: Vec<u8>,
    pub history: Vec<u8>,
}

pub trait NodeClient: Send + Sync {
    /// Fetch ring membership from the bootstrap node.
    fn route_table(&self) -> Result<Vec<RouteEntry>>;

    /// Stream iterator records for `(group, range, since)` from `addr`
    /// into `sink`, sorted by id. Returns the record count.
    fn iterate(
        &self,
        addr: &str,
        group: u32,
        range: &IdRange,
        since: u64,
        sink: &mut dyn FnMut(IterRecord) -> Result<()>,
    ) -> Result<u64>;

    /// Read full objects (data + history blob) for `keys` from `addr`.
    fn bulk_read(&self, addr: &str, keys: &[Id]) -> Result<Vec<BulkItem>>;

    /// Write objects to `addr`. Returns payload bytes written.
    fn bulk_write(&self, addr: &str, items: &[BulkItem]) -> Result<u64>;

    /// Drop objects (data + history) from `addr`.
    fn bulk_delete(&self, addr: &str, keys: &[Id]) -> Result<()>;
}

// -------------------- Framed TCP client --------------------

pub const OP_ROUTE: u8 = 1;
pub const OP_ITERATE: u8 = 2;
pub const OP_BULK_READ: u8 = 3;
pub const OP_BULK_WRITE: u8 = 4;
pub const OP_BULK_DELETE: u8 = 5;

const FRAME_HDR: usize = 5; // op u8 + len u32
const MAX_FRAME: usize = 64 * 1024 * 1024;

pub struct TcpNodeClient {
    bootstrap: String,
    timeout: Duration,
}

impl TcpNodeClient {
    pub fn new(bootstrap: &str, wait_timeout_secs: u64) -> Self {
        Self {
            bootstrap: bootstrap.to_string(),
            timeout: Duration::from_secs(wait_timeout_secs.max(1)),
        }
    }

    fn connect(&self, addr: &str) -> Result<TcpStream> {
        let sockaddr = addr
            .to_socket_addrs()
            .with_context(|| format!("resolve {}", addr))?
            .next()
            .ok_or_else(|| anyhow!("no address for {}", addr))?;
        let stream = TcpStream::connect_timeout(&sockaddr, self.timeout)
            .with_context(|| format!("connect {}", addr))?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        Ok(stream)
    }
}

pub fn write_frame<W: Write>(w: &mut W, op: u8, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_FRAME {
        return Err(anyhow!("frame too large: {}", payload.len()));
    }
    let mut hdr = [0u8; FRAME_HDR];
    hdr[0] = op;
    LittleEndian::write_u32(&mut hdr[1..5], payload.len() as u32);
    w.write_all(&hdr)?;
    if !payload.is_empty() {
        w.write_all(payload)?;
    }
    Ok(())
}

/// Read one frame. Ok(None) on clean EOF before a header.
pub fn read_frame<R: Read>(r: &mut R) -> Result<Option<(u8, Vec<u8>)>> {
    let mut hdr = [0u8; FRAME_HDR];
    match read_exact_or_eof(r, &mut hdr)? {
        true => {}
        false => return Ok(None),
    }
    let op = hdr[0];
    let len = LittleEndian::read_u32(&hdr[1..5]) as usize;
    if len > MAX_FRAME {
        return Err(anyhow!("frame payload too large: {} (max {})", len, MAX_FRAME));
    }
    let mut payload = vec![0u8; len];
    if len > 0 && !read_exact_or_eof(r, &mut payload)? {
        return Err(anyhow!("truncated frame payload (op {})", op));
    }
    Ok(Some((op, payload)))
}

fn read_exact_or_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<bool> {
    use std::io::ErrorKind;
    let mut off = 0usize;
    while off < buf.len() {
        match r.read(&mut buf[off..]) {
            Ok(0) => return Ok(false),
            Ok(n) => off += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(anyhow!("read error: {}", e)),
        }
    }
    Ok(true)
}

impl NodeClient for TcpNodeClient {
    fn route_table(&self) -> Result<Vec<RouteEntry>> {
        let mut stream = self.connect(&self.bootstrap)?;
        write_frame(&mut stream, OP_ROUTE, &[])?;

        let mut out = Vec::new();
        loop {
            let Some((_, payload)) = read_frame(&mut stream)? else {
                return Err(anyhow!("route table stream ended without terminator"));
            };
            if payload.is_empty() {
                break;
            }
            // [start ID_SIZE][group u32][addr_len u16][addr]
            if payload.len() < ID_SIZE + 6 {
                return Err(anyhow!("short route entry: {} bytes", payload.len()));
            }
            let mut start = [0u8; ID_SIZE];
            start.copy_from_slice(&payload[..ID_SIZE]);
            let group = LittleEndian::read_u32(&payload[ID_SIZE..ID_SIZE + 4]);
            let alen = LittleEndian::read_u16(&payload[ID_SIZE + 4..ID_SIZE + 6]) as usize;
            if payload.len() < ID_SIZE + 6 + alen {
                return Err(anyhow!("truncated route entry address"));
            }
            let addr = String::from_utf8_lossy(&payload[ID_SIZE + 6..ID_SIZE + 6 + alen])
                .into_owned();
            out.push(RouteEntry { start, addr, group });
        }
        Ok(out)
    }

    fn iterate(
        &self,
        addr: &str,
        group: u32,
        range: &IdRange,
        since: u64,
        sink: &mut dyn FnMut(IterRecord) -> Result<()>,
    ) -> Result<u64> {
        let mut stream = self.connect(addr)?;

        // [group u32][start ID_SIZE][end ID_SIZE][since u64]
        let mut req = vec![0u8; 4 + 2 * ID_SIZE + 8];
        LittleEndian::write_u32(&mut req[0..4], group);
        req[4..4 + ID_SIZE].copy_from_slice(&range.start);
        req[4 + ID_SIZE..4 + 2 * ID_SIZE].copy_from_slice(&range.end);
        LittleEndian::write_u64(&mut req[4 + 2 * ID_SIZE..], since);
        write_frame(&mut stream, OP_ITERATE, &req)?;

        let mut count = 0u64;
        loop {
            let Some((_, payload)) = read_frame(&mut stream)? else {
                return Err(anyhow!("iterator stream from {} ended without terminator", addr));
            };
            if payload.is_empty() {
                break;
            }
            // a frame may carry several records
            if payload.len() % ITER_RECORD_SIZE != 0 {
                return Err(anyhow!(
                    "iterator frame from {} not a record multiple: {}",
                    addr,
                    payload.len()
                ));
            }
            for chunk in payload.chunks_exact(ITER_RECORD_SIZE) {
                sink(IterRecord::decode(chunk)?)?;
                count += 1;
            }
        }
        Ok(count)
    }

    fn bulk_read(&self, addr: &str, keys: &[Id]) -> Result<Vec<BulkItem>> {
        let mut stream = self.connect(addr)?;

        let mut req = Vec::with_capacity(4 + keys.len() * ID_SIZE);
        let mut tmp4 = [0u8; 4];
        LittleEndian::write_u32(&mut tmp4, keys.len() as u32);
        req.extend_from_slice(&tmp4);
        for k in keys {
            req.extend_from_slice(k);
        }
        write_frame(&mut stream, OP_BULK_READ, &req)?;

        let mut out = Vec::with_capacity(keys.len());
        loop {
            let Some((_, payload)) = read_frame(&mut stream)? else {
                return Err(anyhow!("bulk-read stream from {} ended without terminator", addr));
            };
            if payload.is_empty() {
                break;
            }
            out.push(decode_bulk_item(&payload)?);
        }
        Ok(out)
    }

    fn bulk_write(&self, addr: &str, items: &[BulkItem]) -> Result<u64> {
        let mut stream = self.connect(addr)?;

        for item in items {
            write_frame(&mut stream, OP_BULK_WRITE, &encode_bulk_item(item))?;
        }
        write_frame(&mut stream, OP_BULK_WRITE, &[])?;

        let Some((_, payload)) = read_frame(&mut stream)? else {
            return Err(anyhow!("bulk-write to {}: no status reply", addr));
        };
        if payload.len() < 8 {
            return Err(anyhow!("bulk-write to {}: short status reply", addr));
        }
        Ok(LittleEndian::read_u64(&payload[..8]))
    }

    fn bulk_delete(&self, addr: &str, keys: &[Id]) -> Result<()> {
        let mut stream = self.connect(addr)?;

        let mut req = Vec::with_capacity(4 + keys.len() * ID_SIZE);
        let mut tmp4 = [0u8; 4];
        LittleEndian::write_u32(&mut tmp4, keys.len() as u32);
        req.extend_from_slice(&tmp4);
        for k in keys {
            req.extend_from_slice(k);
        }
        write_frame(&mut stream, OP_BULK_DELETE, &req)?;

        let Some((_, payload)) = read_frame(&mut stream)? else {
            return Err(anyhow!("bulk-delete to {}: no status reply", addr));
        };
        if payload.len() >= 4 {
            let status = LittleEndian::read_i32(&payload[..4]);
            if status < 0 {
                return Err(anyhow!("bulk-delete to {}: status {}", addr, status));
            }
        }
        Ok(())
    }
}

// [id][data_len u32][data][hist_len u32][hist]
fn encode_bulk_item(item: &BulkItem) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ID_SIZE + 8 + item.data.len() + item.history.len());
    buf.extend_from_slice(&item.id);
    let mut tmp4 = [0u8; 4];
    LittleEndian::write_u32(&mut tmp4, item.data.len() as u32);
    buf.extend_from_slice(&tmp4);
    buf.extend_from_slice(&item.data);
    LittleEndian::write_u32(&mut tmp4, item.history.len() as u32);
    buf.extend_from_slice(&tmp4);
    buf.extend_from_slice(&item.history);
    buf
}

fn decode_bulk_item(buf: &[u8]) -> Result<BulkItem> {
    if buf.len() < ID_SIZE + 8 {
        return Err(anyhow!("short bulk item: {} bytes", buf.len()));
    }
    let mut id = [0u8; ID_SIZE];
    id.copy_from_slice(&buf[..ID_SIZE]);
    let dlen = LittleEndian::read_u32(&buf[ID_SIZE..ID_SIZE + 4]) as usize;
    let rest = &buf[ID_SIZE + 4..];
    if rest.len() < dlen + 4 {
        return Err(anyhow!("truncated bulk item data"));
    }
    let data = rest[..dlen].to_vec();
    let hlen = LittleEndian::read_u32(&rest[dlen..dlen + 4]) as usize;
    let hist = &rest[dlen + 4..];
    if hist.len() < hlen {
        return Err(anyhow!("truncated bulk item history"));
    }
    Ok(BulkItem {
        id,
        data,
        history: hist[..hlen].to_vec(),
    })
}
