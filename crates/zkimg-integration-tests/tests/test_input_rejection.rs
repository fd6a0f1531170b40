//! Bad requests fail before any artifact lookup or compilation.

mod common;

use zkimg_core::{InputError, Transformation};

#[tokio::test]
async fn out_of_bounds_crop_has_no_side_effects() {
    let tmp = tempfile::tempdir().unwrap();
    let service = common::service(tmp.path(), 64);
    let err = service
        .submit_transformation_step(None, common::test_card(32, 32), Transformation::Crop { x: 20, y: 0, width: 16, height: 8 })
        .await
        .unwrap_err();

    assert!(err.is_input());
    assert!(err.to_string().contains("out of bounds") || err.to_string().contains("crop"));
    assert_eq!(service.prover().cache().compilations(), 0);
    assert_eq!(common::entries(&tmp.path().join("artifacts")), 0);
    assert!(service.registry().is_empty());
}

#[tokio::test]
async fn oversized_request_is_rejected_untiled() {
    let tmp = tempfile::tempdir().unwrap();
    let service = common::service(tmp.path(), 32);
    let err = service
        .submit_transformation_step(None, common::test_card(40, 8), Transformation::Grayscale)
        .await
        .unwrap_err();
    assert!(err.is_input());
    assert_eq!(service.prover().cache().compilations(), 0);
}

#[tokio::test]
async fn zero_sized_resize_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let service = common::service(tmp.path(), 32);
    let err = service
        .process_large_image(&common::test_card(8, 8), Transformation::Resize { width: 0, height: 4 })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        zkimg_chain::ServiceError::Tiling(zkimg_chain::TilingError::Input(InputError::ZeroDimension { .. }))
    ));
}
