//! Integration tests for the streaming read driver

mod common;

use std::sync::Arc;

use common::{payload, Fixture, RecordingFds, ScriptedEngine};
use iovring::{IovError, Priority, ReadControl, ReadOptions, SyncEngine};

#[cfg(test)]
mod tests {
    use super::*;

    fn options(block_size: usize) -> ReadOptions {
        ReadOptions::new().with_block_size(block_size)
    }

    /// Read `size` bytes in `block` sized rounds; returns data and round count
    fn scripted_read(size: usize, block: usize) -> (Vec<u8>, usize) {
        let fx = Fixture::new();
        let data = payload(size);
        let engine = ScriptedEngine::serving(&data);
        let ctx = fx.ctx(Arc::new(engine.clone()));
        let path = fx.file("data", &data);

        let result = ctx.read_file(&path, &options(block)).unwrap();
        fx.assert_clean();
        (result, engine.rounds())
    }

    #[test]
    fn test_round_counts() {
        let block = 64;
        // ceil(S / B) rounds, plus one zero-length round when B divides S
        for (size, rounds) in [(0, 1), (1, 1), (63, 1), (64, 2), (65, 2), (128, 3), (200, 4)] {
            let (result, actual) = scripted_read(size, block);
            assert_eq!(result, payload(size), "size {}", size);
            assert_eq!(actual, rounds, "size {}", size);
        }
    }

    #[test]
    fn test_sync_engine_reads_real_files() {
        let fx = Fixture::new();
        let ctx = fx.ctx(Arc::new(SyncEngine::new()));

        for size in [0usize, 1, 4095, 4096, 4097, 3 * 4096 + 17] {
            let data = payload(size);
            let path = fx.file(&format!("file_{}", size), &data);
            let result = ctx.read_file(&path, &options(4096)).unwrap();
            assert_eq!(result.len(), size);
            assert_eq!(result, data);
        }
        fx.assert_clean();
    }

    #[test]
    fn test_start_offset() {
        let fx = Fixture::new();
        let ctx = fx.ctx(Arc::new(SyncEngine::new()));
        let data = payload(1000);
        let path = fx.file("data", &data);

        let result = ctx
            .read_file(&path, &options(128).with_start_offset(300))
            .unwrap();
        assert_eq!(result, &data[300..]);

        let past_end = ctx
            .read_file(&path, &options(128).with_start_offset(5000))
            .unwrap();
        assert!(past_end.is_empty());
    }

    #[test]
    fn test_offsets_advance_by_block() {
        let fx = Fixture::new();
        let engine = ScriptedEngine::serving(&payload(250));
        let ctx = fx.ctx(Arc::new(engine.clone()));
        let path = fx.file("data", b"");

        ctx.read_file(&path, &options(100).with_start_offset(10)).unwrap();
        assert_eq!(engine.offsets(), vec![10, 110, 210]);
    }

    #[test]
    fn test_negative_completion_fails() {
        let fx = Fixture::new();
        let engine = ScriptedEngine::serving(&payload(300)).inject(1, -(libc::EIO as i64));
        let ctx = fx.ctx(Arc::new(engine.clone()));
        let path = fx.file("data", b"");

        let err = ctx.read_file(&path, &options(100)).unwrap_err();
        assert!(matches!(err, IovError::Os { code } if code == libc::EIO));
        assert_eq!(err.raw_os_error(), Some(libc::EIO));

        // No retry after the failing round
        assert_eq!(engine.rounds(), 2);
        fx.assert_clean();
    }

    #[test]
    fn test_callback_receives_chunks_and_offsets() {
        let fx = Fixture::new();
        let ctx = fx.ctx(Arc::new(SyncEngine::new()));
        let data = payload(250);
        let path = fx.file("data", &data);

        let mut seen = Vec::new();
        ctx.read_file_with(&path, &options(100), |chunk, offset| {
            seen.push((offset, chunk.to_vec()));
            ReadControl::Continue
        })
        .unwrap();

        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], (0, data[..100].to_vec()));
        assert_eq!(seen[1], (100, data[100..200].to_vec()));
        assert_eq!(seen[2], (200, data[200..].to_vec()));
        fx.assert_clean();
    }

    #[test]
    fn test_callback_seek_repositions() {
        let fx = Fixture::new();
        let engine = ScriptedEngine::serving(&payload(1000));
        let ctx = fx.ctx(Arc::new(engine.clone()));
        let path = fx.file("data", b"");

        let mut calls = 0;
        ctx.read_file_with(&path, &options(100), |_chunk, offset| {
            calls += 1;
            match offset {
                0 => ReadControl::SeekTo(700),
                700 => ReadControl::SeekTo(950),
                _ => ReadControl::Continue,
            }
        })
        .unwrap();

        // 950 yields a 50 byte short read, which ends the stream
        assert_eq!(engine.offsets(), vec![0, 700, 950]);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_seek_skips_short_read_check() {
        let fx = Fixture::new();
        let engine = ScriptedEngine::serving(&payload(150));
        let ctx = fx.ctx(Arc::new(engine.clone()));
        let path = fx.file("data", b"");

        let mut rewound = false;
        ctx.read_file_with(&path, &options(100), |_chunk, offset| {
            if offset == 100 && !rewound {
                rewound = true;
                return ReadControl::SeekTo(0);
            }
            ReadControl::Continue
        })
        .unwrap();

        // The short read at 100 rewinds instead of ending the stream
        assert_eq!(engine.offsets(), vec![0, 100, 0, 100]);
    }

    #[test]
    fn test_callback_stop_ends_early() {
        let fx = Fixture::new();
        let engine = ScriptedEngine::serving(&payload(1000));
        let ctx = fx.ctx(Arc::new(engine.clone()));
        let path = fx.file("data", b"");

        let mut delivered = 0usize;
        ctx.read_file_with(&path, &options(100), |chunk, offset| {
            delivered += chunk.len();
            if offset == 200 {
                ReadControl::Stop
            } else {
                ReadControl::Continue
            }
        })
        .unwrap();

        assert_eq!(delivered, 300);
        assert_eq!(engine.rounds(), 3);
        fx.assert_clean();
    }

    #[test]
    fn test_fd_registration_brackets_the_read() {
        let fx = Fixture::new();
        let ctx = fx.ctx(Arc::new(SyncEngine::new()));
        let path = fx.file("data", &payload(10));

        ctx.read_file(&path, &options(4)).unwrap();

        let calls = fx.fds.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("register "));
        assert_eq!(calls[1], calls[0].replacen("register", "deregister", 1));
    }

    #[test]
    fn test_fd_registration_failure_allocates_nothing() {
        let fx = Fixture::new();
        let ctx = fx
            .ctx(Arc::new(SyncEngine::new()))
            .with_fd_registrar(Arc::new(RecordingFds::refusing()));
        let path = fx.file("data", &payload(10));

        let err = ctx.read_file(&path, &options(4)).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EPERM));
        fx.assert_clean();
    }

    #[test]
    fn test_missing_file() {
        let fx = Fixture::new();
        let ctx = fx.ctx(Arc::new(SyncEngine::new()));

        let err = ctx.read_file(fx.mount.join("nope"), &options(4)).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
        assert!(fx.fds.calls().is_empty());
        fx.assert_clean();
    }

    #[test]
    fn test_vector_failure_releases_everything() {
        let fx = Fixture::new();
        let engine = ScriptedEngine::serving(&payload(10));
        engine.script.lock().unwrap().fail_vector = true;
        let ctx = fx.ctx(Arc::new(engine));
        let path = fx.file("data", b"");

        assert!(matches!(
            ctx.read_file(&path, &options(4)),
            Err(IovError::Engine { .. })
        ));
        assert_eq!(fx.fds.calls().len(), 2);
        fx.assert_clean();
    }

    /// Run a read with a registrar that snapshots resources at deregister time
    fn read_watching_teardown(engine: ScriptedEngine) -> (Result<Vec<u8>, IovError>, Vec<(usize, usize)>) {
        let fx = Fixture::new();
        let fds = Arc::new(RecordingFds::watching(&fx));
        let ctx = fx.ctx(Arc::new(engine)).with_fd_registrar(fds.clone());
        let path = fx.file("data", b"");

        let result = ctx.read_file(&path, &options(4));
        fx.assert_clean();
        (result, fds.alive_at_deregister())
    }

    #[test]
    fn test_fd_released_before_ring_vector_and_buffer() {
        let (result, alive) = read_watching_teardown(ScriptedEngine::serving(&payload(10)));
        assert_eq!(result.unwrap(), payload(10));
        assert_eq!(alive, vec![(1, 1)]);
    }

    #[test]
    fn test_ring_failure_releases_fd_first() {
        let engine = ScriptedEngine::serving(&payload(10));
        engine.script.lock().unwrap().fail_ring = true;

        let (result, alive) = read_watching_teardown(engine);
        assert!(matches!(result, Err(IovError::Engine { .. })));
        // Vector entry and buffer were still alive when the fd went away
        assert_eq!(alive, vec![(1, 1)]);
    }

    #[test]
    fn test_vector_failure_releases_fd_before_buffer() {
        let engine = ScriptedEngine::serving(&payload(10));
        engine.script.lock().unwrap().fail_vector = true;

        let (result, alive) = read_watching_teardown(engine);
        assert!(matches!(result, Err(IovError::Engine { .. })));
        assert_eq!(alive, vec![(0, 1)]);
    }

    #[test]
    fn test_explicit_mount_point_and_priority() {
        let fx = Fixture::new();
        let ctx = fx.ctx(Arc::new(SyncEngine::new()));
        let data = payload(64);
        let path = fx.file("data", &data);

        let opts = options(16)
            .with_mount_point(&fx.mount)
            .with_priority(Some(Priority::High));
        assert_eq!(ctx.read_file(&path, &opts).unwrap(), data);
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let fx = Fixture::new();
        let ctx = fx.ctx(Arc::new(SyncEngine::new()));
        let path = fx.file("data", b"x");

        assert!(matches!(
            ctx.read_file(&path, &options(0)),
            Err(IovError::InvalidParameter { .. })
        ));
        assert!(fx.fds.calls().is_empty());
    }

    #[test]
    fn test_free_function_entry_points() {
        let fx = Fixture::new();
        let ctx = fx.ctx(Arc::new(SyncEngine::new()));
        let data = payload(33);
        let path = fx.file("data", &data);

        assert_eq!(iovring::read_file(&ctx, &path, &options(8)).unwrap(), data);

        let mut total = 0;
        iovring::read_file_with(&ctx, &path, &options(8), |chunk, _| {
            total += chunk.len();
            ReadControl::Continue
        })
        .unwrap();
        assert_eq!(total, 33);
    }
}
