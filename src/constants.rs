/// Bytes per flat tree record: a 4-byte float followed by a 2-byte feature id.
pub const RECORD_SIZE: usize = 4 + 2;
/// Depths with a fully unrolled walk.
pub const UNROLLED_DEPTHS: [usize; 3] = [4, 6, 8];
/// Deepest tree the native arena accepts.
pub const MAX_NATIVE_DEPTH: usize = 10;
/// Native batch widths evaluated with the block walker, widest first.
pub const NATIVE_BLOCK_WIDE: usize = 32;
pub const NATIVE_BLOCK_NARROW: usize = 8;
/// Number of feature vectors scored together by the array back-ends.
pub const BATCH_BLOCK: usize = 8;
/// Default limit on balanced tree depth for the buffer back-ends.
pub const DEFAULT_MAX_DEPTH: usize = 20;
/// Default code size limits for the specializing compiler.
pub const DEFAULT_CODEGEN_MAX_TREES: usize = 10_000;
pub const DEFAULT_CODEGEN_MAX_NODES_PER_TREE: usize = 8_191;
/// Default smallest batch that is split across the rayon pool.
pub const DEFAULT_PARALLEL_MIN_BATCH: usize = 256;
/// Vectors per rayon task when a batch is scored in parallel.
pub const PARALLEL_CHUNK: usize = 64;
