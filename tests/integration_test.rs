use squeeze::processor::{self, DATA_DIR, LATEST_FILE, LOCK_FILE};
use squeeze::{ChangeKind, ChangeMask, ChangeRecord, Error, RunOutcome, Squeeze};
use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::rc::Rc;
use tree_fs::{Tree, TreeBuilder};

fn git(root: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run git {args:?}: {e}"));
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout)
        .expect("git output should be utf-8")
        .trim()
        .to_string()
}

fn setup_test_repo() -> Tree {
    let tree = TreeBuilder::default()
        .add_file("b.txt", "beta content\n")
        .add_file("a.txt", "alpha content\n")
        .add_file("dir/c.txt", "gamma content\nwith a few lines\nof text\n")
        .create()
        .expect("Failed to create test repo tree");

    git(&tree.root, &["init"]);
    git(&tree.root, &["config", "user.name", "Test User"]);
    git(&tree.root, &["config", "user.email", "test@example.com"]);
    fs::write(tree.root.join(".git/info/exclude"), ".squeeze/\n")
        .expect("Failed to exclude data dir");
    git(&tree.root, &["add", "."]);
    git(&tree.root, &["commit", "-m", "Initial commit"]);

    processor::init(&tree.root).expect("Failed to init squeeze dir");
    tree
}

fn collecting(squeeze: &mut Squeeze) -> Rc<RefCell<Vec<ChangeRecord>>> {
    let changes = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&changes);
    squeeze.add_handler(ChangeMask::ALL, move |kind, paths: &[String]| {
        sink.borrow_mut()
            .push(ChangeRecord::new(kind, paths.to_vec()).expect("Handler got a malformed change"));
        Ok(())
    });
    changes
}

#[test]
fn test_first_run_treats_tree_as_added() {
    let tree = setup_test_repo();
    let head = git(&tree.root, &["rev-parse", "HEAD"]);

    let mut squeeze = squeeze::open(&tree.root).expect("Failed to open project");
    let changes = collecting(&mut squeeze);
    let outcome = squeeze.run().expect("Run failed");

    assert!(matches!(
        outcome,
        RunOutcome::Processed { from: None, ref to, .. } if *to == head
    ));
    assert_eq!(
        *changes.borrow(),
        vec![
            ChangeRecord::added("a.txt"),
            ChangeRecord::added("b.txt"),
            ChangeRecord::added("dir/c.txt"),
        ]
    );
    assert_eq!(
        fs::read_to_string(tree.root.join(DATA_DIR).join(LATEST_FILE))
            .expect("Marker should be written"),
        head
    );
}

#[test]
fn test_second_run_reports_commit_changes() {
    let tree = setup_test_repo();
    squeeze::open(&tree.root)
        .expect("Failed to open project")
        .run()
        .expect("First run failed");
    let first = git(&tree.root, &["rev-parse", "HEAD"]);

    fs::write(tree.root.join("a.txt"), "alpha content changed\n").expect("Failed to modify a.txt");
    git(&tree.root, &["rm", "-q", "b.txt"]);
    git(&tree.root, &["mv", "dir/c.txt", "dir/d.txt"]);
    git(&tree.root, &["commit", "-am", "Update files"]);
    let second = git(&tree.root, &["rev-parse", "HEAD"]);

    let mut squeeze = squeeze::open(&tree.root).expect("Failed to open project");
    let changes = collecting(&mut squeeze);
    let outcome = squeeze.run().expect("Second run failed");

    assert!(matches!(
        outcome,
        RunOutcome::Processed { from: Some(ref from), ref to, .. } if *from == first && *to == second
    ));

    let mut changes = changes.borrow().clone();
    changes.sort_by(|a, b| a.paths().cmp(b.paths()));
    assert_eq!(
        changes,
        vec![
            ChangeRecord::modified("a.txt"),
            ChangeRecord::deleted("b.txt"),
            ChangeRecord::renamed("dir/c.txt", "dir/d.txt"),
        ]
    );
    assert_eq!(squeeze.last_run().unwrap().as_deref(), Some(second.as_str()));
}

#[test]
fn test_run_without_new_commits_is_up_to_date() {
    let tree = setup_test_repo();
    squeeze::open(&tree.root)
        .expect("Failed to open project")
        .run()
        .expect("First run failed");

    let mut squeeze = squeeze::open(&tree.root).expect("Failed to open project");
    let changes = collecting(&mut squeeze);

    assert!(matches!(squeeze.run(), Ok(RunOutcome::UpToDate { .. })));
    assert!(changes.borrow().is_empty());
}

#[test]
fn test_low_similarity_rename_is_split() {
    let tree = setup_test_repo();
    squeeze::open(&tree.root)
        .expect("Failed to open project")
        .run()
        .expect("First run failed");

    git(&tree.root, &["mv", "dir/c.txt", "dir/e.txt"]);
    fs::write(
        tree.root.join("dir/e.txt"),
        "gamma content\nwith a few lines\nof changed text\n",
    )
    .expect("Failed to edit renamed file");
    git(&tree.root, &["commit", "-am", "Rename and edit"]);

    let mut squeeze = squeeze::open(&tree.root).expect("Failed to open project");
    let handled = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&handled);
    squeeze.add_handler(ChangeKind::Added | ChangeKind::Deleted, move |kind, paths: &[String]| {
        sink.borrow_mut().push((kind, paths.to_vec()));
        Ok(())
    });
    squeeze.run().expect("Run failed");

    assert_eq!(
        *handled.borrow(),
        vec![
            (ChangeKind::Deleted, vec!["dir/c.txt".to_string()]),
            (ChangeKind::Added, vec!["dir/e.txt".to_string()]),
        ]
    );
}

#[test]
fn test_stale_marker_aborts_run() {
    let tree = setup_test_repo();
    let marker = tree.root.join(DATA_DIR).join(LATEST_FILE);
    fs::write(&marker, "0000000000000000000000000000000000000000").expect("Failed to write marker");

    let mut squeeze = squeeze::open(&tree.root).expect("Failed to open project");
    let changes = collecting(&mut squeeze);

    assert!(matches!(squeeze.run(), Err(Error::StaleRevision(_))));
    assert!(changes.borrow().is_empty());
    assert_eq!(
        fs::read_to_string(&marker).unwrap(),
        "0000000000000000000000000000000000000000"
    );
}

#[test]
fn test_lock_blocks_concurrent_open() {
    let tree = setup_test_repo();
    let lock = tree.root.join(DATA_DIR).join(LOCK_FILE);

    let squeeze = squeeze::open(&tree.root).expect("Failed to open project");
    assert_eq!(
        fs::read_to_string(&lock).unwrap(),
        std::process::id().to_string()
    );
    assert!(matches!(
        squeeze::open(&tree.root),
        Err(Error::Locked { .. })
    ));

    drop(squeeze);
    assert!(!lock.exists(), "Lock should be removed on drop");
}

#[test]
fn test_discover_from_subdirectory() {
    let tree = setup_test_repo();
    let squeeze = squeeze::discover(&tree.root.join("dir")).expect("Failed to discover project");
    assert_eq!(squeeze.base_dir(), tree.root.as_path());
}

#[test]
fn test_unsupported_repo_type_is_rejected() {
    let tree = setup_test_repo();
    fs::write(tree.root.join(DATA_DIR).join("config.yml"), "repo: svn\n")
        .expect("Failed to write config");

    assert!(matches!(
        squeeze::open(&tree.root),
        Err(Error::UnsupportedRepoError(name)) if name == "svn"
    ));
    assert!(!tree.root.join(DATA_DIR).join(LOCK_FILE).exists());
}
