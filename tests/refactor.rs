mod common;

use codeweave::{RejectReason, TransactionError, TransactionStatus};
use common::{open, project, read};
use std::path::Path;

#[test]
fn test_move_helper_into_new_package_file() {
    let dir = project(&[
        ("util.py", "import os\n\n\ndef helper():\n    return os.getcwd()\n\n\ndef other():\n    pass\n"),
        ("main.py", "from util import helper, other\n\nhelper()\nother()\n"),
    ]);
    let codebase = open(dir.path());
    let helper = codebase.symbol("util.py", "helper").unwrap();
    let before = helper.usages().len();

    let report = helper.move_to("lib/util2.py").unwrap();
    assert_eq!(report.status, TransactionStatus::Applied);
    assert!(report.files.iter().any(|f| f.created && f.path == Path::new("lib/util2.py")));

    assert_eq!(
        read(dir.path(), "main.py"),
        "from util import other\nfrom lib.util2 import helper\n\nhelper()\nother()\n"
    );
    assert_eq!(
        read(dir.path(), "lib/util2.py"),
        "import os\n\n\ndef helper():\n    return os.getcwd()\n"
    );
    assert!(!read(dir.path(), "util.py").contains("def helper"));

    let info = helper.info().unwrap();
    assert_eq!(info.file, Path::new("lib/util2.py"));
    assert_eq!(helper.usages().len(), before);
    assert!(helper.usages().iter().all(|u| u.resolved_through.as_deref() == Some(Path::new("lib/util2.py"))));
}

#[test]
fn test_move_round_trip_preserves_usages() {
    let dir = project(&[
        ("util.py", "def helper():\n    pass\n\n\ndef other():\n    helper()\n"),
        ("main.py", "from util import helper\nimport util\n\nhelper()\nutil.helper()\n"),
    ]);
    let codebase = open(dir.path());
    let helper = codebase.symbol("util.py", "helper").unwrap();
    let before = helper.usages().len();
    assert_eq!(before, 3);

    helper.move_to("tools.py").unwrap();
    assert_eq!(helper.usages().len(), before);
    assert_eq!(helper.info().unwrap().file, Path::new("tools.py"));

    helper.move_to("util.py").unwrap();
    assert_eq!(helper.usages().len(), before);
    assert_eq!(helper.info().unwrap().file, Path::new("util.py"));
    assert!(codebase.resolution_warnings().is_empty());
}

#[test]
fn test_repeated_move_is_noop() {
    let dir = project(&[
        ("a.py", "def helper():\n    pass\n"),
        ("main.py", "from a import helper\n\nhelper()\n"),
    ]);
    let codebase = open(dir.path());
    let helper = codebase.symbol("a.py", "helper").unwrap();

    let first = helper.move_to("b.py").unwrap();
    assert!(!first.noop);
    let after_first = (read(dir.path(), "a.py"), read(dir.path(), "b.py"), read(dir.path(), "main.py"));

    let second = helper.move_to("b.py").unwrap();
    assert!(second.noop);
    assert!(second.files.is_empty());
    let after_second = (read(dir.path(), "a.py"), read(dir.path(), "b.py"), read(dir.path(), "main.py"));
    assert_eq!(after_first, after_second);
}

#[test]
fn test_collision_rejects_without_writing() {
    let files = [
        ("a.py", "def helper():\n    pass\n"),
        ("b.py", "def helper():\n    return 2\n"),
        ("main.py", "from a import helper\n\nhelper()\n"),
    ];
    let dir = project(&files);
    let codebase = open(dir.path());
    let generation = codebase.stats().generation;

    let err = codebase.symbol("a.py", "helper").unwrap().move_to("b.py").unwrap_err();
    assert!(matches!(
        err,
        TransactionError::Rejected {
            reason: RejectReason::NameCollision { .. }
        }
    ));
    for (rel, text) in files {
        assert_eq!(read(dir.path(), rel), text);
    }
    assert_eq!(codebase.stats().generation, generation);
}

#[test]
fn test_rename_javascript_across_reexport() {
    let dir = project(&[
        ("src/math.js", "export function add(a, b) {\n  return a + b;\n}\n"),
        ("src/index.js", "export { add } from './math';\n"),
        ("src/app.js", "import { add } from './index';\n\nconsole.log(add(1, 2));\n"),
    ]);
    let codebase = open(dir.path());
    let add = codebase.symbol("src/math.js", "add").unwrap();
    assert_eq!(add.usages().len(), 1);

    add.rename("sum").unwrap();
    assert_eq!(read(dir.path(), "src/math.js"), "export function sum(a, b) {\n  return a + b;\n}\n");
    assert_eq!(read(dir.path(), "src/index.js"), "export { sum } from './math';\n");
    assert_eq!(
        read(dir.path(), "src/app.js"),
        "import { sum } from './index';\n\nconsole.log(sum(1, 2));\n"
    );
    assert_eq!(add.usages().len(), 1);
}

#[test]
fn test_delete_unused_symbol() {
    let dir = project(&[(
        "a.py",
        "import json\nimport sys\n\n\ndef keep():\n    return sys.argv\n\n\ndef drop():\n    return json.dumps({})\n\n\nkeep()\n",
    )]);
    let codebase = open(dir.path());
    let doomed = codebase.symbol("a.py", "drop").unwrap();
    assert!(doomed.is_dead());

    doomed.delete().unwrap();
    assert_eq!(
        read(dir.path(), "a.py"),
        "import sys\n\n\ndef keep():\n    return sys.argv\n\n\nkeep()\n"
    );
    assert!(doomed.info().is_none());
}
