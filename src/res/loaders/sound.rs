use std::any::Any;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::dispatch::UploadToken;
use crate::errors::Result;

use super::super::registry::{Loader, PreloadList};
use super::super::resource::{Resource, ResourceInfo};

/// A built-in silent WAV clip (one channel, 16 bit, 44.1kHz, four zero
/// samples), substituted when a sound fails to decode so a broken asset
/// degrades into silence instead of a crash.
pub const FALLBACK_CLIP: [u8; 52] = [
    b'R', b'I', b'F', b'F', 0x2c, 0x00, 0x00, 0x00, b'W', b'A', b'V', b'E', // riff
    b'f', b'm', b't', b' ', 0x10, 0x00, 0x00, 0x00, // fmt chunk, 16 bytes
    0x01, 0x00, // pcm
    0x01, 0x00, // mono
    0x44, 0xac, 0x00, 0x00, // 44100Hz
    0x88, 0x58, 0x01, 0x00, // byte rate
    0x02, 0x00, // block align
    0x10, 0x00, // 16 bits
    b'd', b'a', b't', b'a', 0x08, 0x00, 0x00, 0x00, // data chunk, 8 bytes
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Handles common audio containers. WAV is parsed in place; `.ogg` and `.mp3`
/// payloads are kept opaque for the embedding's audio decoder. `.mp3` is
/// treated as a streamed format and demands real path semantics.
pub struct SoundLoader {
    preload: PreloadList,
}

impl SoundLoader {
    pub fn new() -> Self {
        SoundLoader {
            preload: PreloadList::new(),
        }
    }
}

impl Loader for SoundLoader {
    fn can_load(&self, ext: &str) -> bool {
        ext == "wav" || ext == "ogg" || ext == "mp3"
    }

    fn supports_buffer(&self, ext: &str) -> bool {
        ext != "mp3"
    }

    fn create_entry(&self) -> Box<dyn Resource> {
        Box::new(ResourceSound::default())
    }

    fn fallback(&self) -> Option<&[u8]> {
        Some(&FALLBACK_CLIP)
    }

    fn preload(&self) -> &PreloadList {
        &self.preload
    }
}

/// A decoded (or opaque) sound clip.
#[derive(Default)]
pub struct ResourceSound {
    info: ResourceInfo,
    sample_rate: u32,
    channels: u16,
    bits: u16,
    /// PCM samples for parsed WAV content, the raw container bytes otherwise.
    samples: Vec<u8>,
}

impl ResourceSound {
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    #[inline]
    pub fn bits(&self) -> u16 {
        self.bits
    }

    #[inline]
    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    /// Checks if the payload was decoded in place. Opaque payloads carry a
    /// zero sample rate and are handed to the embedding's decoder as-is.
    #[inline]
    pub fn is_pcm(&self) -> bool {
        self.sample_rate != 0
    }

    fn load_wav(&mut self, bytes: &[u8]) -> Result<()> {
        let mut r = Cursor::new(bytes);
        r.seek(SeekFrom::Start(12))?;

        let mut fmt = false;
        let mut data = false;

        loop {
            let mut id = [0u8; 4];
            if r.read_exact(&mut id).is_err() {
                // Ran off the end of the chunk list.
                break;
            }

            let size = r.read_u32::<LittleEndian>()?;
            match &id {
                b"fmt " => {
                    if size < 16 {
                        bail!("fmt chunk of {} bytes is too short.", size);
                    }

                    let _format = r.read_u16::<LittleEndian>()?;
                    self.channels = r.read_u16::<LittleEndian>()?;
                    self.sample_rate = r.read_u32::<LittleEndian>()?;
                    let _byte_rate = r.read_u32::<LittleEndian>()?;
                    let _block_align = r.read_u16::<LittleEndian>()?;
                    self.bits = r.read_u16::<LittleEndian>()?;

                    r.seek(SeekFrom::Current(i64::from(size) - 16))?;
                    fmt = true;
                }
                b"data" => {
                    let mut samples = vec![0; size as usize];
                    r.read_exact(&mut samples)?;
                    self.samples = samples;
                    data = true;
                }
                _ => {
                    r.seek(SeekFrom::Current(i64::from(size)))?;
                }
            }

            // Chunks are padded to even offsets.
            if size & 1 == 1 {
                r.seek(SeekFrom::Current(1))?;
            }
        }

        if !fmt || !data {
            bail!("WAV stream is missing its fmt or data chunk.");
        }

        if self.sample_rate == 0 {
            bail!("WAV stream declares a zero sample rate.");
        }

        Ok(())
    }
}

impl Resource for ResourceSound {
    fn info(&self) -> &ResourceInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ResourceInfo {
        &mut self.info
    }

    fn load(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            // Streamed from `info().path` by the embedding's decoder.
            return Ok(());
        }

        if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
            self.load_wav(bytes)
        } else if self.info.extension == "wav" {
            bail!("not a RIFF/WAVE stream.");
        } else {
            self.samples = bytes.to_vec();
            Ok(())
        }
    }

    fn upload(&mut self, _: &UploadToken) -> Result<()> {
        // Hands the samples to the playback device; repeated calls re-publish
        // the same clip, which is harmless.
        Ok(())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
