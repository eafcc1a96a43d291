//! Keeps the reference offset of a device in one page of NOR flash so a
//! multimeter calibration survives resets.
use core::fmt;

use embedded_storage::nor_flash::{NorFlashError, NorFlashErrorKind};
use embedded_storage_async::nor_flash::NorFlash;

const MAGIC: u8 = 0xA5;
const VERSION: u8 = 0x01;
const RECORD_LEN: usize = 4;
const MAX_SPAN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    Flash(E),
    /// Address is not on an erase page boundary
    Misaligned,
    /// Page does not fit in the flash
    OutOfBounds,
    /// Read or write granularity above 16 bytes
    Unsupported,
}

impl<E: NorFlashError> Error<E> {
    pub fn kind(&self) -> NorFlashErrorKind {
        match self {
            Error::Flash(e) => e.kind(),
            Error::Misaligned => NorFlashErrorKind::NotAligned,
            Error::OutOfBounds => NorFlashErrorKind::OutOfBounds,
            Error::Unsupported => NorFlashErrorKind::Other,
        }
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Flash(e) => write!(f, "Flash error: {:?}", e),
            Error::Misaligned => write!(f, "Offset page is not erase aligned"),
            Error::OutOfBounds => write!(f, "Offset page is outside the flash"),
            Error::Unsupported => write!(f, "Flash granularity is not supported"),
        }
    }
}

pub struct OffsetStore<F> {
    flash: F,
    address: u32,
}

impl<F: NorFlash> OffsetStore<F> {
    /// Uses the erase page starting at `address`.
    pub fn new(flash: F, address: u32) -> Result<Self, Error<F::Error>> {
        if F::ERASE_SIZE == 0 || address as usize % F::ERASE_SIZE != 0 {
            return Err(Error::Misaligned);
        }
        if address as usize + F::ERASE_SIZE > flash.capacity() {
            return Err(Error::OutOfBounds);
        }
        if span::<F>() > MAX_SPAN {
            return Err(Error::Unsupported);
        }
        Ok(Self { flash, address })
    }

    /// Reads the stored offset, `None` when the page holds no valid record.
    pub async fn load(&mut self) -> Result<Option<i8>, Error<F::Error>> {
        let mut buf = [0u8; MAX_SPAN];
        let buf = &mut buf[..span::<F>()];
        self.flash
            .read(self.address, buf)
            .await
            .map_err(Error::Flash)?;
        let offset = decode(buf);
        debug!("Stored offset: {}", offset);
        Ok(offset)
    }

    /// Persists `offset`, leaving the flash untouched when it is already
    /// stored.
    pub async fn save(&mut self, offset: i8) -> Result<(), Error<F::Error>> {
        if self.load().await? == Some(offset) {
            return Ok(());
        }
        let mut buf = [0xFFu8; MAX_SPAN];
        buf[..RECORD_LEN].copy_from_slice(&encode(offset));
        self.flash
            .erase(self.address, self.address + F::ERASE_SIZE as u32)
            .await
            .map_err(Error::Flash)?;
        self.flash
            .write(self.address, &buf[..span::<F>()])
            .await
            .map_err(Error::Flash)?;
        info!("Saved offset {} mV at {:#x}", offset, self.address);
        Ok(())
    }

    pub fn release(self) -> F {
        self.flash
    }
}

/// Bytes covering one record at the flash's read and write granularity
fn span<F: NorFlash>() -> usize {
    RECORD_LEN.next_multiple_of(F::READ_SIZE.max(F::WRITE_SIZE).max(1))
}

fn encode(offset: i8) -> [u8; RECORD_LEN] {
    let raw = offset as u8;
    [MAGIC, VERSION, raw, !raw]
}

fn decode(buf: &[u8]) -> Option<i8> {
    match *buf {
        [MAGIC, VERSION, raw, check, ..] if raw == !check => Some(raw as i8),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_storage::nor_flash::ErrorType;
    use embedded_storage_async::nor_flash::ReadNorFlash;
    use futures::executor::block_on;

    const PAGE: usize = 4096;

    /// Two pages of RAM behaving like NOR flash: erase sets bytes to 0xFF,
    /// writes can only clear bits.
    struct RamFlash<const W: usize> {
        data: [u8; 2 * PAGE],
        erases: usize,
    }

    impl<const W: usize> RamFlash<W> {
        fn new() -> Self {
            Self {
                data: [0xFF; 2 * PAGE],
                erases: 0,
            }
        }
    }

    impl<const W: usize> ErrorType for RamFlash<W> {
        type Error = NorFlashErrorKind;
    }

    impl<const W: usize> ReadNorFlash for RamFlash<W> {
        const READ_SIZE: usize = 1;

        async fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
            let start = offset as usize;
            let src = self
                .data
                .get(start..start + bytes.len())
                .ok_or(NorFlashErrorKind::OutOfBounds)?;
            bytes.copy_from_slice(src);
            Ok(())
        }

        fn capacity(&self) -> usize {
            self.data.len()
        }
    }

    impl<const W: usize> NorFlash for RamFlash<W> {
        const WRITE_SIZE: usize = W;
        const ERASE_SIZE: usize = PAGE;

        async fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
            if from as usize % PAGE != 0 || to as usize % PAGE != 0 {
                return Err(NorFlashErrorKind::NotAligned);
            }
            self.data[from as usize..to as usize].fill(0xFF);
            self.erases += 1;
            Ok(())
        }

        async fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
            if offset as usize % W != 0 || bytes.len() % W != 0 {
                return Err(NorFlashErrorKind::NotAligned);
            }
            let start = offset as usize;
            for (cell, byte) in self.data[start..start + bytes.len()].iter_mut().zip(bytes) {
                *cell &= byte;
            }
            Ok(())
        }
    }

    #[test]
    fn erased_page_has_no_offset() {
        let mut store = OffsetStore::new(RamFlash::<4>::new(), PAGE as u32).unwrap();
        assert_eq!(block_on(store.load()), Ok(None));
    }

    #[test]
    fn offsets_survive_a_reload() {
        let mut store = OffsetStore::new(RamFlash::<4>::new(), 0).unwrap();
        block_on(async {
            for offset in -127..=127 {
                store.save(offset).await.unwrap();
                assert_eq!(store.load().await, Ok(Some(offset)));
            }
        });
        let flash = store.release();
        assert_eq!(&flash.data[..4], &[0xA5, 0x01, 127, !127u8]);
        assert!(flash.data[PAGE..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn identical_offset_is_not_rewritten() {
        let mut store = OffsetStore::new(RamFlash::<4>::new(), 0).unwrap();
        block_on(async {
            store.save(-39).await.unwrap();
            store.save(-39).await.unwrap();
            store.save(-38).await.unwrap();
        });
        assert_eq!(store.release().erases, 2);
    }

    #[test]
    fn corrupted_record_is_ignored() {
        let mut flash = RamFlash::<4>::new();
        flash.data[..4].copy_from_slice(&[0xA5, 0x01, 0x10, 0x10]);
        let mut store = OffsetStore::new(flash, 0).unwrap();
        assert_eq!(block_on(store.load()), Ok(None));

        let mut flash = store.release();
        flash.data[..4].copy_from_slice(&[0xA5, 0x02, 0x10, 0xEF]);
        let mut store = OffsetStore::new(flash, 0).unwrap();
        assert_eq!(block_on(store.load()), Ok(None));
    }

    #[test]
    fn wide_writes_are_padded() {
        let mut store = OffsetStore::new(RamFlash::<8>::new(), 0).unwrap();
        block_on(store.save(-1)).unwrap();
        assert_eq!(block_on(store.load()), Ok(Some(-1)));
        let flash = store.release();
        assert_eq!(&flash.data[4..8], &[0xFF; 4]);
    }

    #[test]
    fn rejects_bad_pages() {
        assert!(matches!(
            OffsetStore::new(RamFlash::<4>::new(), 100),
            Err(Error::Misaligned)
        ));
        assert!(matches!(
            OffsetStore::new(RamFlash::<4>::new(), 2 * PAGE as u32),
            Err(Error::OutOfBounds)
        ));
        assert!(matches!(
            OffsetStore::new(RamFlash::<32>::new(), 0),
            Err(Error::Unsupported)
        ));
    }

    #[test]
    fn errors_map_to_flash_kinds() {
        let err: Error<NorFlashErrorKind> = Error::Misaligned;
        assert_eq!(err.kind(), NorFlashErrorKind::NotAligned);
        let err = Error::Flash(NorFlashErrorKind::OutOfBounds);
        assert_eq!(err.kind(), NorFlashErrorKind::OutOfBounds);
    }
}
