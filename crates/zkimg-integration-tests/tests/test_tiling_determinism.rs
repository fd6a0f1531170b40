//! Tile decomposition is deterministic and invisible below the size limit.

mod common;

use zkimg_core::Transformation;
use zkimg_crypto::image_commitment;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_input_same_root() {
    let tmp = tempfile::tempdir().unwrap();
    let service = common::service(tmp.path(), 32);
    let image = common::test_card(70, 45);

    for t in [
        Transformation::Grayscale,
        Transformation::Crop { x: 10, y: 5, width: 50, height: 30 },
        Transformation::Resize { width: 33, height: 20 },
    ] {
        let first = service.process_large_image(&image, t).await.unwrap();
        let second = service.process_large_image(&image, t).await.unwrap();
        assert_eq!(first.set.root, second.set.root, "{t}");
        assert_eq!(first.result_image, t.apply(&image).unwrap(), "{t}");
        assert!(first.set.tiles.len() > 1);
        assert!(service.verify_tile_proofs(&first.set), "{t}");
    }
}

#[tokio::test]
async fn untiled_root_equals_chain_commitment() {
    let tmp = tempfile::tempdir().unwrap();
    let service = common::service(tmp.path(), 32);
    let image = common::test_card(24, 20);
    let t = Transformation::Resize { width: 12, height: 10 };

    let tiled = service.process_large_image(&image, t).await.unwrap();
    let step = service.submit_transformation_step(None, image, t).await.unwrap();

    assert_eq!(tiled.set.tiles.len(), 1);
    assert_eq!(tiled.set.root, step.step.output_hash);
    assert_eq!(tiled.set.root, image_commitment(&step.output).unwrap());
}

#[tokio::test]
async fn tile_sets_do_not_verify_elsewhere() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    let producer = common::service(a.path(), 32);
    let stranger = common::service(b.path(), 32);
    let outcome = producer
        .process_large_image(&common::test_card(40, 40), Transformation::Grayscale)
        .await
        .unwrap();
    assert!(producer.verify_tile_proofs(&outcome.set));
    // No verification keys on the other side, and it never compiles them.
    assert!(!stranger.verify_tile_proofs(&outcome.set));
    assert_eq!(stranger.prover().cache().compilations(), 0);
}
