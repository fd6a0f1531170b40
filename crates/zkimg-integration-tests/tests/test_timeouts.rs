//! Deadlines surface as timeouts and leave the cache usable.

mod common;

use std::time::Duration;

use zkimg_core::{Deadline, Transformation};
use zkimg_zkp::mock::MockBackend;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_compile_times_out_then_recovers() {
    let tmp = tempfile::tempdir().unwrap();
    let service = common::service_with(
        tmp.path(),
        64,
        MockBackend::new().with_compile_delay(Duration::from_millis(400)),
    );
    let err = service
        .submit_transformation_step_within(
            None,
            common::test_card(8, 8),
            Transformation::Grayscale,
            Deadline::after(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "{err}");
    assert!(service.registry().is_empty());

    let receipt = service
        .submit_transformation_step_within(None, common::test_card(8, 8), Transformation::Grayscale, Deadline::none())
        .await
        .unwrap();
    assert_eq!(receipt.step.index, 0);
    // The retry joined the compilation the timed-out call started.
    assert_eq!(service.prover().cache().compilations(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_prove_times_out() {
    let tmp = tempfile::tempdir().unwrap();
    let service = common::service_with(
        tmp.path(),
        64,
        MockBackend::new().with_prove_delay(Duration::from_millis(400)),
    );
    service
        .prover()
        .cache()
        .ensure_artifacts(
            zkimg_core::TransformKind::Grayscale,
            &zkimg_core::CircuitParams::new().with("orig_width", 8).with("orig_height", 8),
        )
        .await
        .unwrap();

    let err = service
        .submit_transformation_step_within(
            None,
            common::test_card(8, 8),
            Transformation::Grayscale,
            Deadline::after(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "{err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tile_timeout_cancels_the_set() {
    let tmp = tempfile::tempdir().unwrap();
    let service = common::service_with(
        tmp.path(),
        16,
        MockBackend::new().with_prove_delay(Duration::from_millis(400)),
    );
    let err = service
        .process_large_image_within(
            &common::test_card(40, 40),
            Transformation::Grayscale,
            Deadline::after(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "{err}");
}
