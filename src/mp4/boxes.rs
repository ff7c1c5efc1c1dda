use bytes::{BufMut, Bytes, BytesMut};

/// One ISO-BMFF box: a four character type, its own fields, then children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mp4Box {
    /// Four character code
    pub box_type: [u8; 4],
    /// Fields written between the header and the first child
    pub payload: Bytes,
    /// Written after `payload`
    pub children: Vec<Mp4Box>,
}

impl Mp4Box {
    /// A box with fields and no children
    pub fn leaf(box_type: &[u8; 4], payload: impl Into<Bytes>) -> Self {
        Self {
            box_type: *box_type,
            payload: payload.into(),
            children: Vec::new(),
        }
    }

    /// A box holding only children
    pub fn container(box_type: &[u8; 4], children: Vec<Mp4Box>) -> Self {
        Self {
            box_type: *box_type,
            payload: Bytes::new(),
            children,
        }
    }

    /// A full box: version and 24-bit flags ahead of `body`
    pub fn full(box_type: &[u8; 4], version: u8, flags: u32, body: &[u8]) -> Self {
        let mut payload = BytesMut::with_capacity(4 + body.len());
        payload.put_u32((u32::from(version) << 24) | (flags & 0x00ff_ffff));
        payload.put_slice(body);
        Self::leaf(box_type, payload.freeze())
    }

    /// Appends `children`
    pub fn with_children(mut self, children: Vec<Mp4Box>) -> Self {
        self.children.extend(children);
        self
    }

    /// Serialized size including the 8 byte header
    pub fn size(&self) -> usize {
        8 + self.payload.len() + self.children.iter().map(Mp4Box::size).sum::<usize>()
    }

    /// Serializes the box and its children
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.reserve(self.size());
        buf.put_u32(self.size() as u32);
        buf.put_slice(&self.box_type);
        buf.put_slice(&self.payload);
        for child in &self.children {
            child.write_to(buf);
        }
    }

    /// Serializes into a new buffer
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size());
        self.write_to(&mut buf);
        buf.freeze()
    }
}
