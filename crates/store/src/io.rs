//! Byte codecs for stored records: big-endian fixed-width integers,
//! length-prefixed UTF-8 strings, and enum variant names (so records
//! survive enum reordering). Decode failures surface as
//! `StorageError::Corrupt` with context.

use defmap_model::{Access, Error, Flavor, GlobalRef, Kind, Result};

use crate::alloc::to_unit_id;
use crate::idset::IdSet;
use crate::records::{DefData, DocData, RefData, SigData, SourceInfo, UseData};

pub(crate) fn put_bool(buf: &mut Vec<u8>, v: bool) {
    buf.push(u8::from(v));
}

pub(crate) fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub(crate) fn put_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub(crate) fn put_str(buf: &mut Vec<u8>, s: &str) {
    put_u32(buf, s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}

/// A bounds-checked cursor over an encoded record.
pub(crate) struct Dec<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Dec<'a> {
    pub fn new(buf: &'a [u8]) -> Dec<'a> {
        Dec { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(Error::corrupt(format!(
                "record truncated at byte {} (wanted {n} more of {})",
                self.pos,
                self.buf.len()
            )));
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn get_bool(&mut self) -> Result<bool> {
        Ok(self.take(1)?[0] != 0)
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes(bytes.try_into().expect("4 bytes")))
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        let bytes = self.take(8)?;
        Ok(i64::from_be_bytes(bytes.try_into().expect("8 bytes")))
    }

    pub fn get_str(&mut self) -> Result<String> {
        let len = self.get_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::corrupt(format!("invalid UTF-8 in record: {e}")))
    }
}

fn put_kind(buf: &mut Vec<u8>, kind: Kind) {
    put_str(buf, kind.name());
}

fn get_kind(dec: &mut Dec<'_>) -> Result<Kind> {
    let name = dec.get_str()?;
    Kind::from_name(&name).ok_or_else(|| Error::corrupt(format!("unknown kind '{name}'")))
}

fn get_flavor(dec: &mut Dec<'_>) -> Result<Flavor> {
    let name = dec.get_str()?;
    Flavor::from_name(&name).ok_or_else(|| Error::corrupt(format!("unknown flavor '{name}'")))
}

fn get_access(dec: &mut Dec<'_>) -> Result<Access> {
    let name = dec.get_str()?;
    Access::from_name(&name).ok_or_else(|| Error::corrupt(format!("unknown access '{name}'")))
}

pub(crate) fn encode_def(def: &DefData) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    put_i64(&mut buf, def.id);
    put_i64(&mut buf, def.outer_id.unwrap_or(0));
    put_kind(&mut buf, def.kind);
    put_str(&mut buf, def.flavor.name());
    put_bool(&mut buf, def.exported);
    put_str(&mut buf, def.access.name());
    put_str(&mut buf, &def.name);
    put_u32(&mut buf, def.offset);
    put_u32(&mut buf, def.body_start);
    put_u32(&mut buf, def.body_end);
    buf
}

pub(crate) fn decode_def(buf: &[u8]) -> Result<DefData> {
    let mut dec = Dec::new(buf);
    let id = dec.get_i64()?;
    if to_unit_id(id) == 0 {
        return Err(Error::corrupt(format!("def id {id} in reserved unit 0")));
    }
    let outer_id = match dec.get_i64()? {
        0 => None,
        outer => Some(outer),
    };
    Ok(DefData {
        id,
        outer_id,
        kind: get_kind(&mut dec)?,
        flavor: get_flavor(&mut dec)?,
        exported: dec.get_bool()?,
        access: get_access(&mut dec)?,
        name: dec.get_str()?,
        offset: dec.get_u32()?,
        body_start: dec.get_u32()?,
        body_end: dec.get_u32()?,
    })
}

fn put_ref(buf: &mut Vec<u8>, rd: &RefData) {
    match rd {
        RefData::Local(id) => {
            put_bool(buf, true);
            put_i64(buf, *id);
        }
        RefData::Global(gref) => {
            put_bool(buf, false);
            put_str(buf, &gref.to_string());
        }
    }
}

fn get_ref(dec: &mut Dec<'_>) -> Result<RefData> {
    if dec.get_bool()? {
        Ok(RefData::Local(dec.get_i64()?))
    } else {
        Ok(RefData::Global(GlobalRef::from_string(&dec.get_str()?)))
    }
}

pub(crate) fn encode_refs(refs: &[RefData]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + refs.len() * 12);
    put_u32(&mut buf, refs.len() as u32);
    for rd in refs {
        put_ref(&mut buf, rd);
    }
    buf
}

pub(crate) fn decode_refs(buf: &[u8]) -> Result<Vec<RefData>> {
    let mut dec = Dec::new(buf);
    let count = dec.get_u32()? as usize;
    let mut refs = Vec::with_capacity(count);
    for _ in 0..count {
        refs.push(get_ref(&mut dec)?);
    }
    Ok(refs)
}

fn put_use(buf: &mut Vec<u8>, u: &UseData) {
    put_ref(buf, &u.target);
    put_kind(buf, u.kind);
    put_u32(buf, u.offset);
    put_u32(buf, u.length);
}

fn get_use(dec: &mut Dec<'_>) -> Result<UseData> {
    Ok(UseData {
        target: get_ref(dec)?,
        kind: get_kind(dec)?,
        offset: dec.get_u32()?,
        length: dec.get_u32()?,
    })
}

fn put_uses(buf: &mut Vec<u8>, uses: &[UseData]) {
    put_u32(buf, uses.len() as u32);
    for u in uses {
        put_use(buf, u);
    }
}

fn get_uses(dec: &mut Dec<'_>) -> Result<Vec<UseData>> {
    let count = dec.get_u32()? as usize;
    let mut uses = Vec::with_capacity(count);
    for _ in 0..count {
        uses.push(get_use(dec)?);
    }
    Ok(uses)
}

pub(crate) fn encode_uses(uses: &[UseData]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + uses.len() * 24);
    put_uses(&mut buf, uses);
    buf
}

pub(crate) fn decode_uses(buf: &[u8]) -> Result<Vec<UseData>> {
    get_uses(&mut Dec::new(buf))
}

pub(crate) fn encode_sig(sig: &SigData) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 + sig.text.len());
    put_str(&mut buf, &sig.text);
    put_uses(&mut buf, &sig.uses);
    buf
}

pub(crate) fn decode_sig(buf: &[u8]) -> Result<SigData> {
    let mut dec = Dec::new(buf);
    Ok(SigData {
        text: dec.get_str()?,
        uses: get_uses(&mut dec)?,
    })
}

pub(crate) fn encode_doc(doc: &DocData) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    put_u32(&mut buf, doc.offset);
    put_u32(&mut buf, doc.length);
    put_uses(&mut buf, &doc.uses);
    buf
}

pub(crate) fn decode_doc(buf: &[u8]) -> Result<DocData> {
    let mut dec = Dec::new(buf);
    Ok(DocData {
        offset: dec.get_u32()?,
        length: dec.get_u32()?,
        uses: get_uses(&mut dec)?,
    })
}

pub(crate) fn encode_id_set(ids: &IdSet) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + ids.len() * 8);
    put_u32(&mut buf, ids.len() as u32);
    for id in ids.iter() {
        put_i64(&mut buf, id);
    }
    buf
}

pub(crate) fn decode_id_set(buf: &[u8]) -> Result<IdSet> {
    let mut dec = Dec::new(buf);
    let count = dec.get_u32()? as usize;
    let mut elems = Vec::with_capacity(count);
    for _ in 0..count {
        elems.push(dec.get_i64()?);
    }
    // stored sets are sorted; rebuild defensively anyway
    Ok(elems.into_iter().collect())
}

pub(crate) fn encode_source_info(info: &SourceInfo) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + info.source.len());
    put_str(&mut buf, &info.source);
    put_i64(&mut buf, info.indexed);
    buf
}

pub(crate) fn decode_source_info(buf: &[u8]) -> Result<SourceInfo> {
    let mut dec = Dec::new(buf);
    Ok(SourceInfo {
        source: dec.get_str()?,
        indexed: dec.get_i64()?,
    })
}

/// Packs a name-index key as `name ++ 0x00 ++ id:be64`, so lexicographic
/// byte order is `(name, id)` order and prefix scans work directly.
pub(crate) fn name_key(name: &str, id: i64) -> Vec<u8> {
    let mut key = Vec::with_capacity(name.len() + 9);
    key.extend_from_slice(name.as_bytes());
    key.push(0);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Inverse of [`name_key`].
pub(crate) fn split_name_key(key: &[u8]) -> Result<(&str, i64)> {
    if key.len() < 9 || key[key.len() - 9] != 0 {
        return Err(Error::corrupt("malformed name index key"));
    }
    let (name, tail) = key.split_at(key.len() - 9);
    let name = std::str::from_utf8(name)
        .map_err(|e| Error::corrupt(format!("invalid UTF-8 in name index key: {e}")))?;
    let id = i64::from_be_bytes(tail[1..].try_into().expect("8 bytes"));
    Ok((name, id))
}
