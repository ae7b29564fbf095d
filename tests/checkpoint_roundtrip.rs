mod common;

use common::{blob_splits, quiet_config};
use ferrite_trainer::data::DataSource;
use ferrite_trainer::loss::CrossEntropyLoss;
use ferrite_trainer::optim::{make_optimizer, Optimizer};
use ferrite_trainer::train::train_epoch;
use ferrite_trainer::{Checkpoint, CheckpointStore, Mlp, Model, NetworkSpec, PersistenceError};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn trained(optimizer: &str) -> (Mlp, Box<dyn Optimizer>) {
    let config = ferrite_trainer::TrainingConfig { optimizer: optimizer.into(), ..quiet_config() };
    let mut model = Mlp::new(&NetworkSpec::relu(6, &[5], 4), &mut StdRng::seed_from_u64(4));
    let mut opt = make_optimizer(&model.parameters(), &config).unwrap();
    let (mut train, _, _) = blob_splits(8);
    train_epoch(&mut model, &mut train, &CrossEntropyLoss::new(0.1), opt.as_mut(), Some(1.0), 1).unwrap();
    (model, opt)
}

#[test]
fn persisted_checkpoint_reloads_bit_for_bit() {
    for kind in ["adam", "sgd"] {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("best.json");
        let (model, opt) = trained(kind);
        let checkpoint = Checkpoint::capture(3, &model, opt.as_ref(), 0.8125, &quiet_config());

        checkpoint.persist(&path).unwrap();
        let loaded = Checkpoint::load(&path).unwrap();

        assert_eq!(loaded, checkpoint);
        assert_eq!(loaded.epoch, 3);
        assert_eq!(loaded.val_acc.to_bits(), 0.8125f64.to_bits());
        for (name, tensor) in &checkpoint.model_state {
            let other = &loaded.model_state[name];
            for (a, b) in tensor.iter().zip(other.iter()) {
                assert_eq!(a.to_bits(), b.to_bits());
            }
        }
        assert!(!dir.path().join("best.json.tmp").exists());
    }
}

#[test]
fn loaded_checkpoint_restores_model_outputs_and_optimizer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/dir/best.json");
    let (mut model, opt) = trained("adam");
    let checkpoint = Checkpoint::capture(1, &model, opt.as_ref(), 0.5, &quiet_config());
    checkpoint.persist(&path).unwrap();

    let (_, _, mut test) = blob_splits(8);
    let batch = test.batches().next().unwrap();
    let expected = model.forward(&batch.inputs).unwrap();

    let mut fresh = Mlp::new(&NetworkSpec::relu(6, &[5], 4), &mut StdRng::seed_from_u64(99));
    let store = CheckpointStore::load(&path).unwrap();
    store.restore_into(&mut fresh).unwrap();
    assert_eq!(fresh.forward(&batch.inputs).unwrap(), expected);

    let config = quiet_config();
    let mut other_opt = make_optimizer(&fresh.parameters(), &config).unwrap();
    other_opt.load_state(&store.best().unwrap().optimizer_state).unwrap();
    assert_eq!(other_opt.state(), opt.state());
}

#[test]
fn overwrite_replaces_previous_file_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("best.json");
    let (model, opt) = trained("sgd");
    Checkpoint::capture(1, &model, opt.as_ref(), 0.1, &quiet_config()).persist(&path).unwrap();
    Checkpoint::capture(2, &model, opt.as_ref(), 0.2, &quiet_config()).persist(&path).unwrap();
    assert_eq!(Checkpoint::load(&path).unwrap().epoch, 2);
}

#[test]
fn mismatched_architecture_is_rejected() {
    let (model, opt) = trained("sgd");
    let checkpoint = Checkpoint::capture(1, &model, opt.as_ref(), 0.1, &quiet_config());
    let mut wider = Mlp::new(&NetworkSpec::relu(6, &[7], 4), &mut StdRng::seed_from_u64(0));
    let before = wider.state_dict();
    assert!(matches!(checkpoint.restore_into(&mut wider), Err(PersistenceError::StateMismatch(_))));
    assert_eq!(wider.state_dict(), before);
}

#[test]
fn missing_and_corrupt_files_are_errors() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(Checkpoint::load(&dir.path().join("nope.json")), Err(PersistenceError::Io { .. })));
    let bad = dir.path().join("bad.json");
    std::fs::write(&bad, b"{\"epoch\": 1").unwrap();
    assert!(matches!(Checkpoint::load(&bad), Err(PersistenceError::Serde(_))));
}

#[test]
fn tracker_api_keys_are_not_kept_in_the_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("best.json");
    let mut config = quiet_config();
    config.checkpoint_path = Some(path.clone());
    config.tracking.remote_a.api_key = Some("key-a".into());
    config.tracking.remote_b.api_key = Some("key-b".into());

    let (model, opt) = trained("adam");
    let mut store = CheckpointStore::new(&config);
    assert!(store.consider(1, &model, opt.as_ref(), 0.7));

    let in_memory = store.best().unwrap();
    assert_eq!(in_memory.config.tracking.remote_a.api_key, None);
    assert_eq!(in_memory.config.tracking.remote_b.api_key, None);
    assert!(!std::fs::read_to_string(&path).unwrap().contains("key-a"));

    let on_disk = CheckpointStore::load(&path).unwrap();
    assert_eq!(on_disk.best(), Some(in_memory));
}

#[test]
fn failed_rename_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("best.json");
    std::fs::create_dir(&path).unwrap();
    std::fs::write(path.join("occupied"), b"x").unwrap();

    let (model, opt) = trained("sgd");
    let err = Checkpoint::capture(1, &model, opt.as_ref(), 0.1, &quiet_config()).persist(&path).unwrap_err();
    assert!(matches!(err, PersistenceError::Io { .. }));
    assert!(!dir.path().join("best.json.tmp").exists());
}
