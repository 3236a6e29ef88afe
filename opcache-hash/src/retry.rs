use std::io;

/// Run `f`, transparently retrying as long as it fails with [`io::ErrorKind::Interrupted`]
/// (`EINTR`). Every direct syscall wrapped anywhere in this crate family — open, read, link,
/// unlink, stat — goes through this helper so a signal never surfaces as a spurious failure.
pub fn retry_eintr<T>(mut f: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match f() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_retry_eintr_passes_through_success() {
        assert_eq!(retry_eintr(|| Ok::<_, io::Error>(42)).unwrap(), 42);
    }

    #[test]
    fn test_retry_eintr_retries_interrupted() {
        let attempts = Cell::new(0);
        let result = retry_eintr(|| {
            attempts.set(attempts.get() + 1);
            if attempts.get() < 3 {
                Err(io::Error::from(io::ErrorKind::Interrupted))
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_retry_eintr_propagates_other_errors() {
        let result: io::Result<()> = retry_eintr(|| Err(io::Error::from(io::ErrorKind::NotFound)));
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
    }
}
