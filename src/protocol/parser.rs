use super::types::Sentence;
use crate::utils::error::{Result, RosPoolError};
use smallvec::SmallVec;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Upper bound for a single word; anything larger is treated as a corrupt stream
pub const MAX_WORD_LEN: usize = 16 * 1024 * 1024;

/// Encode a word length prefix (1 to 5 bytes)
pub fn encode_length(len: usize) -> Result<SmallVec<[u8; 5]>> {
    let len = u32::try_from(len)
        .map_err(|_| RosPoolError::Protocol(format!("Word too long: {} bytes", len)))?;

    let mut out = SmallVec::new();
    if len < 0x80 {
        out.push(len as u8);
    } else if len < 0x4000 {
        out.extend_from_slice(&((len | 0x8000) as u16).to_be_bytes());
    } else if len < 0x20_0000 {
        out.extend_from_slice(&(len | 0xC0_0000).to_be_bytes()[1..]);
    } else if len < 0x1000_0000 {
        out.extend_from_slice(&(len | 0xE000_0000).to_be_bytes());
    } else {
        out.push(0xF0);
        out.extend_from_slice(&len.to_be_bytes());
    }
    Ok(out)
}

/// Read a word length prefix
pub async fn read_length<S>(stream: &mut S) -> Result<usize>
where
    S: AsyncRead + Unpin + Send,
{
    let first = stream.read_u8().await? as usize;

    let len = if first & 0x80 == 0 {
        first
    } else if first & 0xC0 == 0x80 {
        ((first & 0x3F) << 8) | stream.read_u8().await? as usize
    } else if first & 0xE0 == 0xC0 {
        ((first & 0x1F) << 16) | stream.read_u16().await? as usize
    } else if first & 0xF0 == 0xE0 {
        let mut rest = [0u8; 3];
        stream.read_exact(&mut rest).await?;
        ((first & 0x0F) << 24)
            | (rest[0] as usize) << 16
            | (rest[1] as usize) << 8
            | rest[2] as usize
    } else if first == 0xF0 {
        stream.read_u32().await? as usize
    } else {
        return Err(RosPoolError::Protocol(format!(
            "Reserved control byte: 0x{:02x}",
            first
        )));
    };

    Ok(len)
}

/// Read one word. A zero-length word ends a sentence.
pub async fn read_word<S>(stream: &mut S) -> Result<String>
where
    S: AsyncRead + Unpin + Send,
{
    let len = read_length(stream).await?;
    if len > MAX_WORD_LEN {
        return Err(RosPoolError::Protocol(format!(
            "Word length {} exceeds limit",
            len
        )));
    }

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;

    // Devices may send non-UTF-8 (legacy codepage) values
    Ok(String::from_utf8(buf)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
}

/// Read words up to the terminating zero-length word
pub async fn read_sentence<S>(stream: &mut S) -> Result<Sentence>
where
    S: AsyncRead + Unpin + Send,
{
    let mut words = Vec::new();
    loop {
        let word = read_word(stream).await?;
        if word.is_empty() {
            break;
        }
        words.push(word);
    }

    let sentence = Sentence::new(words);
    trace!("Read sentence: {}", sentence);
    Ok(sentence)
}

/// Write a sentence followed by its terminating zero-length word
pub async fn write_sentence<S>(stream: &mut S, sentence: &Sentence) -> Result<()>
where
    S: AsyncWrite + Unpin + Send,
{
    let mut buf = Vec::with_capacity(
        sentence.words().iter().map(|w| w.len() + 2).sum::<usize>() + 1,
    );
    for word in sentence.words() {
        buf.extend_from_slice(&encode_length(word.len())?);
        buf.extend_from_slice(word.as_bytes());
    }
    buf.push(0);

    stream.write_all(&buf).await?;
    stream.flush().await?;

    trace!("Wrote sentence: {} words", sentence.words().len());

    Ok(())
}
