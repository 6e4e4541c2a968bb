//! Persistence: a versioned big-endian wire format for the whole graph.
//!
//! The stream carries the tuning parameters, the lookup and tombstone maps,
//! and every node slot (neighbor lists per level, the item, the deleted
//! flag), followed by the entry-point ID. Identifiers and items go through
//! pluggable [`Codec`]s; [`BincodeCodec`] is the serde-based default.
//!
//! Distance metrics and codecs are code, not data: `load` takes them as
//! arguments instead of reading them from the stream. A truncated or
//! corrupt stream yields an error and no index.

use crate::distance::Metric;
use crate::error::{IndexError, Result};
use crate::hnsw::graph::{HnswIndex, IndexState, Node};
use crate::item::Item;
use crate::util::{ArrayBitSet, ObjectPool};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

/// First (and so far only) version of the wire format.
pub const VERSION_1: u8 = 0x01;

/// Serializes values of one type into a byte stream and back.
pub trait Codec<T>: Send + Sync {
    /// Writes one value.
    fn encode(&self, value: &T, out: &mut dyn Write) -> io::Result<()>;
    /// Reads one value.
    fn decode(&self, input: &mut dyn Read) -> io::Result<T>;
}

/// Default codec: bincode over serde.
pub struct BincodeCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for BincodeCodec<T> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Codec<T> for BincodeCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T, out: &mut dyn Write) -> io::Result<()> {
        bincode::serialize_into(out, value).map_err(|e| io::Error::other(e.to_string()))
    }

    fn decode(&self, input: &mut dyn Read) -> io::Result<T> {
        bincode::deserialize_from(input)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }
}

fn write_u8(out: &mut dyn Write, value: u8) -> io::Result<()> {
    out.write_all(&[value])
}

fn write_bool(out: &mut dyn Write, value: bool) -> io::Result<()> {
    write_u8(out, value as u8)
}

fn write_i32(out: &mut dyn Write, value: i32) -> io::Result<()> {
    out.write_all(&value.to_be_bytes())
}

fn write_i64(out: &mut dyn Write, value: i64) -> io::Result<()> {
    out.write_all(&value.to_be_bytes())
}

fn write_f64(out: &mut dyn Write, value: f64) -> io::Result<()> {
    out.write_all(&value.to_be_bytes())
}

fn read_u8(input: &mut dyn Read) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_bool(input: &mut dyn Read) -> io::Result<bool> {
    Ok(read_u8(input)? != 0)
}

fn read_i32(input: &mut dyn Read) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

fn read_i64(input: &mut dyn Read) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(i64::from_be_bytes(buf))
}

fn read_f64(input: &mut dyn Read) -> io::Result<f64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(f64::from_be_bytes(buf))
}

fn corrupt(message: impl Into<String>) -> IndexError {
    IndexError::Io(io::Error::new(io::ErrorKind::InvalidData, message.into()))
}

/// Reads an i32 that must be a valid count in `0..=bound`.
fn read_count(input: &mut dyn Read, bound: usize, what: &str) -> Result<usize> {
    let value = read_i32(input)?;
    if value < 0 || value as usize > bound {
        return Err(corrupt(format!("{what} count {value} out of range")));
    }
    Ok(value as usize)
}

impl<TItem, M> HnswIndex<TItem, M>
where
    TItem: Item,
    M: Metric<TItem::Vector>,
{
    /// Writes the index to a byte stream.
    ///
    /// Holds the global lock for the duration, so the snapshot is
    /// consistent; queries proceed, mutation blocks.
    pub fn save(&self, out: &mut dyn Write) -> Result<()> {
        let state = self.state.lock();
        let nodes = self.nodes.read();

        write_u8(out, VERSION_1)?;
        write_i32(out, self.dimensions as i32)?;
        write_i32(out, state.capacity as i32)?;
        write_i32(out, self.m as i32)?;
        write_i32(out, self.max_m as i32)?;
        write_i32(out, self.max_m0 as i32)?;
        write_f64(out, self.level_lambda)?;
        write_i32(out, self.ef() as i32)?;
        write_i32(out, self.ef_construction as i32)?;
        write_bool(out, self.remove_enabled)?;
        write_i32(out, state.node_count as i32)?;

        write_i32(out, state.lookup.len() as i32)?;
        for (id, &node_id) in &state.lookup {
            self.id_codec.encode(id, out)?;
            write_i32(out, node_id as i32)?;
        }

        write_i32(out, state.tombstones.len() as i32)?;
        for (id, &version) in &state.tombstones {
            self.id_codec.encode(id, out)?;
            write_i64(out, version)?;
        }

        write_i32(out, nodes.len() as i32)?;
        for slot in nodes.iter() {
            match slot {
                None => write_i32(out, -1)?,
                Some(node) => {
                    write_i32(out, node.id as i32)?;
                    {
                        let connections = node.connections.lock();
                        write_i32(out, connections.len() as i32)?;
                        for level in connections.iter() {
                            write_i32(out, level.len() as i32)?;
                            for &neighbour in level {
                                write_i32(out, neighbour as i32)?;
                            }
                        }
                    }
                    let item = node.item();
                    self.item_codec.encode(&item, out)?;
                    write_bool(out, node.is_deleted())?;
                }
            }
        }

        let entry_id = self
            .entry_point
            .read()
            .as_ref()
            .map_or(-1, |entry| entry.id as i32);
        write_i32(out, entry_id)?;

        tracing::info!(node_count = state.node_count, "index saved");
        Ok(())
    }

    /// Reads an index from a byte stream, using bincode codecs.
    pub fn load(input: &mut dyn Read, metric: M) -> Result<Self>
    where
        TItem: Serialize + DeserializeOwned + 'static,
        TItem::Id: Serialize + DeserializeOwned + 'static,
    {
        Self::load_with_codecs(
            input,
            metric,
            Box::new(BincodeCodec::default()),
            Box::new(BincodeCodec::default()),
        )
    }

    /// Reads an index from a byte stream with caller-supplied codecs.
    ///
    /// The metric and the codecs must match the ones the index was built
    /// with; the stream does not carry them.
    pub fn load_with_codecs(
        input: &mut dyn Read,
        metric: M,
        id_codec: Box<dyn Codec<TItem::Id>>,
        item_codec: Box<dyn Codec<TItem>>,
    ) -> Result<Self> {
        let version = read_u8(input)?;
        if version != VERSION_1 {
            return Err(IndexError::UnsupportedVersion(version));
        }

        let dimensions = read_count(input, i32::MAX as usize, "dimensions")?;
        let capacity = read_count(input, i32::MAX as usize, "capacity")?;
        let m = read_count(input, i32::MAX as usize, "m")?;
        let max_m = read_count(input, i32::MAX as usize, "max_m")?;
        let max_m0 = read_count(input, i32::MAX as usize, "max_m0")?;
        let level_lambda = read_f64(input)?;
        let ef = read_count(input, i32::MAX as usize, "ef")?;
        let ef_construction = read_count(input, i32::MAX as usize, "ef_construction")?;
        let remove_enabled = read_bool(input)?;
        let node_count = read_count(input, capacity, "node")?;

        let lookup_len = read_count(input, node_count, "lookup")?;
        let mut lookup = HashMap::with_capacity(lookup_len);
        for _ in 0..lookup_len {
            let id = id_codec.decode(input)?;
            let node_id = read_count(input, node_count.saturating_sub(1), "lookup entry")?;
            lookup.insert(id, node_id as u32);
        }

        let tombstone_len = read_count(input, node_count, "tombstone")?;
        let mut tombstones = HashMap::with_capacity(tombstone_len);
        for _ in 0..tombstone_len {
            let id = id_codec.decode(input)?;
            let version = read_i64(input)?;
            tombstones.insert(id, version);
        }

        let slot_len = read_count(input, i32::MAX as usize, "node slot")?;
        if slot_len != capacity {
            return Err(corrupt(format!(
                "node array length {slot_len} does not match capacity {capacity}"
            )));
        }
        let mut slots: Vec<Option<Arc<Node<TItem>>>> = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            let id = read_i32(input)?;
            if id == -1 {
                slots.push(None);
                continue;
            }
            if id < 0 || id as usize >= node_count {
                return Err(corrupt(format!("node id {id} out of range")));
            }
            let num_levels = read_count(input, 256, "level")?;
            if num_levels == 0 {
                return Err(corrupt("node with zero levels"));
            }
            let mut connections = Vec::with_capacity(num_levels);
            for _ in 0..num_levels {
                let len = read_count(input, capacity, "neighbour")?;
                let mut level = Vec::with_capacity(len);
                for _ in 0..len {
                    let neighbour = read_i32(input)?;
                    if neighbour < 0 || neighbour as usize >= node_count {
                        return Err(corrupt(format!("neighbour id {neighbour} out of range")));
                    }
                    level.push(neighbour as u32);
                }
                connections.push(level);
            }
            let item = item_codec.decode(input)?;
            let deleted = read_bool(input)?;
            slots.push(Some(Arc::new(Node::from_parts(
                id as u32,
                connections,
                Arc::new(item),
                deleted,
            ))));
        }

        let entry_id = read_i32(input)?;
        let entry_point = match entry_id {
            -1 => None,
            id if id >= 0 => Some(
                slots
                    .get(id as usize)
                    .and_then(Clone::clone)
                    .ok_or_else(|| corrupt(format!("entry point {id} not present")))?,
            ),
            id => return Err(corrupt(format!("entry point {id} out of range"))),
        };

        let pool_size = std::thread::available_parallelism().map_or(1, |n| n.get());
        let index = HnswIndex {
            dimensions,
            m,
            max_m,
            max_m0,
            level_lambda,
            ef: AtomicUsize::new(ef),
            ef_construction,
            remove_enabled,
            metric,
            id_codec,
            item_codec,
            state: Mutex::new(IndexState {
                node_count,
                capacity,
                lookup,
                tombstones,
                item_locks: HashMap::new(),
            }),
            nodes: RwLock::new(slots),
            entry_point: RwLock::new(entry_point),
            visited_pool: RwLock::new(Arc::new(ObjectPool::new(pool_size, || {
                ArrayBitSet::new(capacity)
            }))),
            excluded: Mutex::new(ArrayBitSet::new(capacity)),
        };
        tracing::info!(node_count, "index loaded");
        Ok(index)
    }

    /// Saves to a file, atomically: the stream goes to a temp file that is
    /// renamed over the target only once fully written.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = std::path::PathBuf::from(tmp);

        let mut out = BufWriter::new(File::create(&tmp)?);
        self.save(&mut out)?;
        out.flush()?;
        drop(out);
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Loads from a file with bincode codecs.
    pub fn load_from_path(path: &Path, metric: M) -> Result<Self>
    where
        TItem: Serialize + DeserializeOwned + 'static,
        TItem::Id: Serialize + DeserializeOwned + 'static,
    {
        let mut input = BufReader::new(File::open(path)?);
        Self::load(&mut input, metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::SquaredEuclidean;
    use crate::item::DenseItem;

    fn make_index(removable: bool) -> HnswIndex<DenseItem<u64>, SquaredEuclidean> {
        let index = HnswIndex::builder(2, SquaredEuclidean, 32)
            .with_m(4)
            .with_ef(10)
            .with_ef_construction(10)
            .with_remove_enabled(removable)
            .build();
        for id in 0u64..20 {
            let x = (id % 5) as f32;
            let y = (id / 5) as f32;
            index.add(DenseItem::new(id, vec![x, y])).unwrap();
        }
        index
    }

    fn tmp_path(name: &str) -> std::path::PathBuf {
        let id = uuid::Uuid::new_v4();
        std::env::temp_dir().join(format!("smallworld_{name}_{id}.idx"))
    }

    #[test]
    fn test_roundtrip_preserves_results() {
        let index = make_index(false);
        let mut buffer = Vec::new();
        index.save(&mut buffer).unwrap();

        let loaded: HnswIndex<DenseItem<u64>, _> =
            HnswIndex::load(&mut buffer.as_slice(), SquaredEuclidean).unwrap();

        assert_eq!(loaded.size(), index.size());
        assert_eq!(loaded.dimensions(), 2);
        assert_eq!(loaded.m(), 4);
        assert_eq!(loaded.max_item_count(), 32);

        for query in [vec![0.0, 0.0], vec![2.5, 1.5], vec![4.0, 3.0]] {
            let before = index.find_nearest(&query, 5);
            let after = loaded.find_nearest(&query, 5);
            assert_eq!(before.len(), after.len());
            for (a, b) in before.iter().zip(after.iter()) {
                assert_eq!(a.item.id(), b.item.id());
                assert_eq!(a.distance, b.distance);
            }
        }
    }

    #[test]
    fn test_roundtrip_preserves_tombstones() {
        let index = make_index(true);
        assert!(index.remove(&3, 0));
        assert!(index.remove(&7, 2));

        let mut buffer = Vec::new();
        index.save(&mut buffer).unwrap();
        let loaded: HnswIndex<DenseItem<u64>, _> =
            HnswIndex::load(&mut buffer.as_slice(), SquaredEuclidean).unwrap();

        assert_eq!(loaded.size(), 18);
        assert!(loaded.get(&3).is_none());
        assert!(loaded.get(&7).is_none());
        // Tombstone versions still gate stale re-inserts
        assert!(!loaded
            .add(DenseItem::with_version(7, vec![0.0, 0.0], 1))
            .unwrap());

        let hits = loaded.find_nearest(&vec![3.0, 0.0], 20);
        assert!(hits.iter().all(|hit| *hit.item.id() != 3));
    }

    #[test]
    fn test_roundtrip_empty_index() {
        let index: HnswIndex<DenseItem<u64>, _> =
            HnswIndex::builder(2, SquaredEuclidean, 8).build();
        let mut buffer = Vec::new();
        index.save(&mut buffer).unwrap();
        let loaded: HnswIndex<DenseItem<u64>, _> =
            HnswIndex::load(&mut buffer.as_slice(), SquaredEuclidean).unwrap();
        assert_eq!(loaded.size(), 0);
        assert!(loaded.find_nearest(&vec![0.0, 0.0], 3).is_empty());
    }

    #[test]
    fn test_loaded_index_accepts_inserts() {
        let index = make_index(false);
        let mut buffer = Vec::new();
        index.save(&mut buffer).unwrap();
        let loaded: HnswIndex<DenseItem<u64>, _> =
            HnswIndex::load(&mut buffer.as_slice(), SquaredEuclidean).unwrap();

        loaded.add(DenseItem::new(100, vec![9.0, 9.0])).unwrap();
        assert_eq!(loaded.size(), 21);
        let hits = loaded.find_nearest(&vec![9.0, 9.0], 1);
        assert_eq!(*hits[0].item.id(), 100);
    }

    #[test]
    fn test_bad_version_rejected() {
        let index = make_index(false);
        let mut buffer = Vec::new();
        index.save(&mut buffer).unwrap();
        buffer[0] = 0x7f;
        let result: Result<HnswIndex<DenseItem<u64>, _>> =
            HnswIndex::load(&mut buffer.as_slice(), SquaredEuclidean);
        assert!(matches!(result, Err(IndexError::UnsupportedVersion(0x7f))));
    }

    #[test]
    fn test_truncated_stream_rejected() {
        let index = make_index(false);
        let mut buffer = Vec::new();
        index.save(&mut buffer).unwrap();
        buffer.truncate(buffer.len() / 2);
        let result: Result<HnswIndex<DenseItem<u64>, _>> =
            HnswIndex::load(&mut buffer.as_slice(), SquaredEuclidean);
        assert!(result.is_err());
    }

    #[test]
    fn test_garbage_counts_rejected() {
        // A stream that declares a huge lookup count must not allocate
        let mut buffer = Vec::new();
        make_index(false).save(&mut buffer).unwrap();
        // lookup count sits right after the fixed-size header:
        // version, five i32 params, f64 lambda, two i32 widths, bool, i32 count
        let header = 1 + 5 * 4 + 8 + 2 * 4 + 1 + 4;
        buffer[header..header + 4].copy_from_slice(&i32::MAX.to_be_bytes());
        let result: Result<HnswIndex<DenseItem<u64>, _>> =
            HnswIndex::load(&mut buffer.as_slice(), SquaredEuclidean);
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_load_path() {
        let path = tmp_path("roundtrip");
        let index = make_index(false);
        index.save_to_path(&path).unwrap();

        let loaded: HnswIndex<DenseItem<u64>, _> =
            HnswIndex::load_from_path(&path, SquaredEuclidean).unwrap();
        assert_eq!(loaded.size(), 20);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_save_to_path_leaves_no_temp_file() {
        let path = tmp_path("tmpfile");
        let index = make_index(false);
        index.save_to_path(&path).unwrap();

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        assert!(!std::path::PathBuf::from(tmp).exists());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_bincode_codec_roundtrip() {
        let codec: BincodeCodec<DenseItem<String>> = BincodeCodec::default();
        let item = DenseItem::with_version("k1".to_string(), vec![1.0, 2.0], 3);
        let mut buffer = Vec::new();
        codec.encode(&item, &mut buffer).unwrap();
        let back = codec.decode(&mut buffer.as_slice()).unwrap();
        assert_eq!(item, back);
    }
}
