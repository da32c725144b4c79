mod common;

use common::{open, project, usage_map, write};
use std::path::PathBuf;

#[test]
fn test_single_cycle_without_tail() {
    let dir = project(&[
        ("a.py", "import b\n"),
        ("b.py", "import c\n"),
        ("c.py", "import a\n"),
        ("d.py", "import a\n"),
    ]);
    let cycles = open(dir.path()).detect_import_cycles();
    assert_eq!(cycles.len(), 1);
    assert_eq!(
        cycles[0].files,
        vec![PathBuf::from("a.py"), PathBuf::from("b.py"), PathBuf::from("c.py")]
    );
}

#[test]
fn test_dead_code_is_conservative() {
    let dir = project(&[
        (
            "shapes.py",
            "class Shape:\n    def area(self):\n        return 0\n\n    def unused_helper(self):\n        return 1\n\n\nclass Square(Shape):\n    def area(self):\n        return 4\n",
        ),
        (
            "main.py",
            "import functools\nfrom shapes import Square\n\n\n@functools.cache\ndef registered():\n    pass\n\n\ndef measure(shape):\n    return shape.area()\n\n\ndef forgotten():\n    pass\n\n\nif __name__ == '__main__':\n    measure(Square())\n",
        ),
        ("plugins.py", "def hook():\n    pass\n"),
        ("loader.py", "from plugins import *\n\nrun = 1\nprint(run)\n"),
        ("orphan.py", "def lonely():\n    pass\n"),
    ]);
    let report = open(dir.path()).dead_code_report();
    let dead: Vec<&str> = report.dead_symbols.iter().map(|s| s.qualified_name.as_str()).collect();

    assert!(dead.contains(&"forgotten"));
    assert!(dead.contains(&"lonely"));
    // Decorated, overriding, base-of-live, accessed on unknown receivers and
    // wildcard-exposed symbols all stay.
    for live in ["registered", "measure", "Square", "Square.area", "Shape", "Shape.area", "hook"] {
        assert!(!dead.contains(&live), "{live} reported dead");
    }
    assert!(report.dead_files.contains(&PathBuf::from("orphan.py")));
    assert!(!report.dead_files.contains(&PathBuf::from("plugins.py")));
}

#[test]
fn test_incremental_matches_full_rebuild() {
    let dir = project(&[
        ("pkg/__init__.py", "from pkg.core import run\n"),
        ("pkg/core.py", "from pkg.helpers import clean\n\n\ndef run(x):\n    return clean(x)\n"),
        ("pkg/helpers.py", "def clean(x):\n    return x\n\n\ndef spare():\n    pass\n"),
        ("app.py", "from pkg import run\nfrom pkg.helpers import *\n\nrun(1)\nspare()\n"),
    ]);
    let codebase = open(dir.path());

    // Rename on disk behind the codebase's back, add a file and drop one.
    write(
        dir.path(),
        "pkg/helpers.py",
        "def clean(x):\n    return x.strip()\n\n\ndef spare_part():\n    pass\n",
    );
    write(dir.path(), "extra.py", "from pkg.helpers import spare_part\n\nspare_part()\n");
    std::fs::remove_file(dir.path().join("pkg/__init__.py")).unwrap();
    codebase.notify_changed([
        PathBuf::from("pkg/helpers.py"),
        PathBuf::from("extra.py"),
        PathBuf::from("pkg/__init__.py"),
    ]);

    let fresh = open(dir.path());
    assert_eq!(usage_map(&codebase), usage_map(&fresh));

    let warnings = |cb: &codeweave::Codebase| {
        let mut w: Vec<String> = cb.resolution_warnings().iter().map(|w| w.to_string()).collect();
        w.sort();
        w
    };
    assert_eq!(warnings(&codebase), warnings(&fresh));
    assert!(!warnings(&codebase).is_empty());

    let (a, b) = (codebase.stats(), fresh.stats());
    assert_eq!(a.graph.symbol_count, b.graph.symbol_count);
    assert_eq!(a.graph.total_edges, b.graph.total_edges);
}

#[test]
fn test_rebuild_keeps_handles() {
    let dir = project(&[
        ("util.py", "def helper():\n    pass\n"),
        ("main.py", "from util import helper\n\nhelper()\n"),
    ]);
    let codebase = open(dir.path());
    let helper = codebase.symbol("util.py", "helper").unwrap();
    codebase.invalidate_all().unwrap();
    assert_eq!(helper.info().unwrap().name, "helper");
    assert_eq!(helper.usages().len(), 1);
}

#[test]
fn test_complexity_and_unused_imports() {
    let dir = project(&[(
        "a.py",
        "import os\nimport sys\n\n\ndef branchy(x):\n    if x and sys.argv:\n        return 1\n    for _ in range(x):\n        pass\n    return 0\n",
    )]);
    let codebase = open(dir.path());
    let report = codebase.complexity_report();
    let branchy = report.functions.iter().find(|f| f.qualified_name == "branchy").unwrap();
    assert_eq!(branchy.complexity, 4);

    let unused: Vec<String> = codebase.unused_imports().into_iter().map(|u| u.local_name).collect();
    assert_eq!(unused, vec!["os".to_string()]);
    assert!(codebase.parse_diagnostics().is_empty());
}
