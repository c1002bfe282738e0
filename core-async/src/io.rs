//! Async I/O traits and adapters.
//!
//! `StreamReader` turns a byte stream (for example an HTTP body) into an
//! `AsyncRead`, which is how bridge implementations hand bodies to parsers.

pub use tokio::io::{
    copy, empty, AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt,
    BufReader, BufWriter, Lines, ReadBuf,
};

pub use tokio_util::io::StreamReader;
