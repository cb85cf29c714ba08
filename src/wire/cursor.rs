use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{WireError, MAGIC};

/// Reads fields off an inbound datagram in the order WSJT-X writes them.
pub(crate) struct Reader {
    buf: Bytes,
}

impl Reader {
    pub fn new(buf: Bytes) -> Self {
        Reader { buf }
    }

    fn need(&self, n: usize) -> Result<(), WireError> {
        if self.buf.remaining() < n {
            return Err(WireError::Truncated {
                need: n,
                have: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn header(&mut self) -> Result<(u32, u32), WireError> {
        self.need(12)?;
        let magic = self.buf.get_u32();
        if magic != MAGIC {
            return Err(WireError::BadMagic { found: magic });
        }
        let schema = self.buf.get_u32();
        let pkt_type = self.buf.get_u32();
        Ok((schema, pkt_type))
    }

    /// A length-prefixed `qstring`. `-1` (0xffffffff as i32) marks a null
    /// string rather than an empty one; both come back as `None`/`Some("")`.
    pub fn qstring(&mut self) -> Result<Option<String>, WireError> {
        self.need(4)?;
        let len = self.buf.get_i32();
        if len < 0 {
            return Ok(None);
        }
        let len = len as usize;
        self.need(len)?;
        let bytes = self.buf.copy_to_bytes(len);
        let s = String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8)?;
        Ok(Some(s))
    }

    pub fn byte(&mut self) -> Result<u8, WireError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn boolean(&mut self) -> Result<bool, WireError> {
        Ok(self.byte()? != 0)
    }

    pub fn u32(&mut self) -> Result<u32, WireError> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn i32(&mut self) -> Result<i32, WireError> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    pub fn u64(&mut self) -> Result<u64, WireError> {
        self.need(8)?;
        Ok(self.buf.get_u64())
    }

    pub fn f64(&mut self) -> Result<f64, WireError> {
        self.need(8)?;
        Ok(self.buf.get_f64())
    }

    /// A `(DateOff, TimeOff, TimeSpec[, offset])` tuple as used by
    /// `QSOLogged`'s two embedded timestamps.
    pub fn datetime(&mut self) -> Result<(u64, u32, u8, i32), WireError> {
        let date = self.u64()?;
        let time = self.u32()?;
        let spec = self.byte()?;
        let offset = if spec == 2 { self.i32()? } else { 0 };
        Ok((date, time, spec, offset))
    }
}

/// Builds an outbound datagram in the order WSJT-X expects them.
pub(crate) struct Writer {
    buf: BytesMut,
}

impl Writer {
    pub fn new() -> Self {
        Writer { buf: BytesMut::with_capacity(64) }
    }

    pub fn header(&mut self, pkt_type: u32) {
        self.buf.put_u32(MAGIC);
        self.buf.put_u32(super::SCHEMA);
        self.buf.put_u32(pkt_type);
        self.qstring(Some(super::CLIENT_ID));
    }

    pub fn qstring(&mut self, s: Option<&str>) {
        match s {
            None => self.buf.put_i32(-1),
            Some(s) => {
                let bytes = s.as_bytes();
                self.buf.put_i32(bytes.len() as i32);
                self.buf.put_slice(bytes);
            }
        }
    }

    pub fn byte(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn boolean(&mut self, v: bool) {
        self.buf.put_u8(v as u8);
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    pub fn i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    pub fn u64(&mut self, v: u64) {
        self.buf.put_u64(v);
    }

    pub fn f64(&mut self, v: f64) {
        self.buf.put_f64(v);
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}
