use groovyscope_api::{FileIndexedEvent, Phase, Severity, SymbolKind, SymbolOrigin};
use groovyscope_core::{
    Documents, EventBus, GroovyscopeError, WorkspaceBuilder, WorkspaceConfig,
    WorkspaceCoordinator, WorkspaceState,
};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use url::Url;

fn config(home: &Path) -> WorkspaceConfig {
    WorkspaceConfig {
        worker_threads: 2,
        gradle_user_home: Some(home.join("gradle")),
        maven_repository: Some(home.join("m2")),
        ..Default::default()
    }
}

fn write(root: &Path, name: &str, text: &str) {
    let path = root.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

fn open(root: &Path, home: &Path) -> WorkspaceCoordinator {
    WorkspaceBuilder::new(root)
        .with_config(config(home))
        .build()
        .unwrap()
}

fn foo_bar_workspace() -> (TempDir, TempDir) {
    let ws = tempdir().unwrap();
    let home = tempdir().unwrap();
    write(ws.path(), "A.groovy", "class Foo {}\n");
    write(ws.path(), "B.groovy", "class Bar extends Foo {}\n");
    (ws, home)
}

#[tokio::test]
async fn test_rename_reaches_dependents_and_reindexes() {
    let (dir, home) = foo_bar_workspace();
    let ws = open(dir.path(), home.path());
    let a = ws.root().join("A.groovy");
    let b = ws.root().join("B.groovy");

    let indexed = ws.initialize().await.unwrap();
    assert_eq!(indexed.file_count, 2);
    let foo = ws.search_symbols("Foo").await.unwrap();
    assert_eq!(foo.len(), 1);
    assert_eq!(foo[0].kind, SymbolKind::Class);
    assert!(ws.affected_files(&a).contains(&b));

    let mut events = ws.events().subscribe_file_indexed();
    fs::write(&a, "class Baz {}\n").unwrap();
    let update = ws.update_file(&a).await.unwrap();

    assert_eq!(update.affected.first(), Some(&a));
    assert!(update.affected.contains(&b));
    assert_eq!(update.recompiled, vec![b.clone()]);
    assert!(ws.search_symbols("Foo").await.unwrap().is_empty());
    assert_eq!(ws.search_symbols("Baz").await.unwrap().len(), 1);

    let first = events.recv().await.unwrap();
    let second = events.recv().await.unwrap();
    assert_eq!(first.path, a);
    assert_eq!(second.path, b);
    assert!(second.is_success());

    ws.close().await.unwrap();
}

#[tokio::test]
async fn test_body_only_edit_does_not_recompile_dependents() {
    let ws_dir = tempdir().unwrap();
    let home = tempdir().unwrap();
    write(ws_dir.path(), "A.groovy", "class Foo {\n  int size() { 1 }\n}\n");
    write(ws_dir.path(), "B.groovy", "class Bar extends Foo {}\n");
    let ws = open(ws_dir.path(), home.path());
    ws.initialize().await.unwrap();

    let a = ws.root().join("A.groovy");
    fs::write(&a, "class Foo {\n  int size() { 2 }\n}\n").unwrap();
    let update = ws.update_file(&a).await.unwrap();
    assert!(update.affected.contains(&ws.root().join("B.groovy")));
    assert!(update.recompiled.is_empty());
}

#[tokio::test]
async fn test_transitive_dependents_come_breadth_first() {
    let ws_dir = tempdir().unwrap();
    let home = tempdir().unwrap();
    write(ws_dir.path(), "C.groovy", "class Base {}\n");
    write(ws_dir.path(), "B.groovy", "class Middle extends Base {}\n");
    write(ws_dir.path(), "A.groovy", "class Top extends Middle {}\n");
    write(ws_dir.path(), "D.groovy", "class Lonely {}\n");
    let ws = open(ws_dir.path(), home.path());
    ws.initialize().await.unwrap();

    let root = ws.root().to_path_buf();
    assert_eq!(
        ws.affected_files(&root.join("C.groovy")),
        vec![root.join("C.groovy"), root.join("B.groovy"), root.join("A.groovy")]
    );
    assert_eq!(ws.affected_files(&root.join("D.groovy")), vec![root.join("D.groovy")]);
}

#[tokio::test]
async fn test_deleted_file_leaves_no_records() {
    let (dir, home) = foo_bar_workspace();
    let ws = open(dir.path(), home.path());
    ws.initialize().await.unwrap();
    let a = ws.root().join("A.groovy");
    let b = ws.root().join("B.groovy");

    fs::remove_file(&a).unwrap();
    let update = ws.update_file(&a).await.unwrap();
    assert!(update.removed);
    assert_eq!(update.recompiled, vec![b.clone()]);

    for query in ["", "Foo", "Bar"] {
        let records = ws.search_symbols(query).await.unwrap();
        assert!(records.iter().all(|r| r.location.path != a));
    }
    assert_eq!(ws.index().indexed_files().unwrap(), vec![b]);
}

#[tokio::test]
async fn test_index_survives_restart() {
    let (dir, home) = foo_bar_workspace();
    let ws = open(dir.path(), home.path());
    ws.initialize().await.unwrap();
    ws.close().await.unwrap();
    drop(ws);

    let ws = open(dir.path(), home.path());
    ws.initialize().await.unwrap();
    let report = ws.index().open_report().clone();
    assert!(report.persistent);
    assert!(report.cold_start.is_none());
    assert_eq!(report.files_loaded, 2);
    assert_eq!(ws.search_symbols("Bar").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_corrupt_index_is_rebuilt_from_sources() {
    let (dir, home) = foo_bar_workspace();
    let ws = open(dir.path(), home.path());
    ws.initialize().await.unwrap();
    let index_dir = ws.config().index_path(ws.root());
    ws.close().await.unwrap();
    drop(ws);

    fs::write(index_dir.join("MANIFEST"), "not json at all").unwrap();

    let ws = open(dir.path(), home.path());
    ws.initialize().await.unwrap();
    assert!(ws.index().open_report().cold_start.is_some());
    assert_eq!(ws.search_symbols("Foo").await.unwrap().len(), 1);
    assert_eq!(ws.search_symbols("Bar").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reinitialize_after_index_directory_deleted() {
    let (dir, home) = foo_bar_workspace();
    let ws = open(dir.path(), home.path());
    ws.initialize().await.unwrap();
    fs::remove_dir_all(ws.config().index_path(ws.root())).unwrap();

    let event = ws.initialize().await.unwrap();
    assert_eq!(event.file_count, 2);
    assert_eq!(ws.state(), WorkspaceState::Ready);
    assert_eq!(ws.search_symbols("Foo").await.unwrap().len(), 1);
    assert!(ws.config().index_path(ws.root()).join("MANIFEST").exists());
}

#[tokio::test]
async fn test_unterminated_comment_keeps_a_partial_tree() {
    let ws_dir = tempdir().unwrap();
    let home = tempdir().unwrap();
    let ws = open(ws_dir.path(), home.path());
    ws.initialize().await.unwrap();
    let path = ws.root().join("Broken.groovy");
    let text = "class Broken {\n  int x\n}\n/* never closed\nclass Hidden {}\n";

    let update = ws.update_file_text(&path, text.to_string(), 1).await.unwrap();
    assert!(
        update
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Syntax && d.message.contains("unterminated block comment"))
    );
    assert!(update.symbols.iter().any(|r| r.qualified_name == "Broken"));

    let result = ws
        .compile(&path, text.to_string(), Phase::SemanticAnalysis)
        .await
        .unwrap();
    let tree = result.tree.expect("partial tree");
    assert_eq!(tree.phase, Phase::Parse);
    assert!(!result.successful);
}

#[tokio::test]
async fn test_closing_a_document_falls_back_to_disk() {
    let ws_dir = tempdir().unwrap();
    let home = tempdir().unwrap();
    write(ws_dir.path(), "A.groovy", "class OnDisk {}\n");
    let ws = Arc::new(open(ws_dir.path(), home.path()));
    ws.initialize().await.unwrap();

    let path = ws.root().join("A.groovy");
    let uri = Url::from_file_path(&path).unwrap().to_string();
    let docs = Documents::new(Arc::clone(&ws));

    docs.did_open(&uri, "class OnDisk {}\n".into(), 1).await.unwrap();
    docs.did_change(&uri, "class InEditor {}\n".into(), 2).await.unwrap();
    assert_eq!(docs.workspace_symbol("InEditor").await.unwrap().len(), 1);
    assert!(docs.workspace_symbol("OnDisk").await.unwrap().is_empty());

    let update = docs.did_close(&uri).await.unwrap();
    assert_eq!(update.symbols[0].qualified_name, "OnDisk");
    assert!(docs.workspace_symbol("InEditor").await.unwrap().is_empty());
}

fn utf8(out: &mut Vec<u8>, s: &str) {
    out.push(1);
    out.extend_from_slice(&(s.len() as u16).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

/// `public class <name>` with no members.
fn empty_class(internal_name: &str) -> Vec<u8> {
    let mut b = vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34];
    b.extend_from_slice(&5u16.to_be_bytes());
    utf8(&mut b, internal_name);
    b.extend_from_slice(&[7, 0, 1]);
    utf8(&mut b, "java/lang/Object");
    b.extend_from_slice(&[7, 0, 3]);
    b.extend_from_slice(&0x0021u16.to_be_bytes());
    b.extend_from_slice(&[0, 2, 0, 4, 0, 0]);
    b.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
    b
}

fn write_jar(path: &Path, classes: &[&str]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    let options = zip::write::SimpleFileOptions::default();
    for class in classes {
        zip.start_file(format!("{class}.class"), options).unwrap();
        zip.write_all(&empty_class(class)).unwrap();
    }
    zip.finish().unwrap();
}

#[tokio::test]
async fn test_maven_dependencies_are_indexed_as_archives() {
    let ws_dir = tempdir().unwrap();
    let home = tempdir().unwrap();
    write(
        ws_dir.path(),
        "pom.xml",
        r#"<project>
  <groupId>org.acme</groupId>
  <artifactId>app</artifactId>
  <version>1.0</version>
  <dependencies>
    <dependency>
      <groupId>com.acme</groupId>
      <artifactId>widgets</artifactId>
      <version>2.1</version>
    </dependency>
    <dependency>
      <groupId>com.acme</groupId>
      <artifactId>missing</artifactId>
      <version>9.9</version>
    </dependency>
  </dependencies>
</project>"#,
    );
    write(
        ws_dir.path(),
        "src/main/groovy/app/Uses.groovy",
        "package app\nimport com.acme.Widget\nclass Uses {\n  Widget widget\n}\n",
    );
    let jar = home.path().join("m2/com/acme/widgets/2.1/widgets-2.1.jar");
    write_jar(&jar, &["com/acme/Widget"]);

    let ws = open(ws_dir.path(), home.path());
    ws.initialize().await.unwrap();

    assert_eq!(ws.index().dependencies().unwrap(), vec![jar.clone()]);
    let widget = ws.search_symbols("com.acme.Widget").await.unwrap();
    assert_eq!(widget.len(), 1);
    assert_eq!(widget[0].origin, SymbolOrigin::Archive);
    assert_eq!(widget[0].location.path, jar);
    assert_eq!(ws.search_symbols("app.Uses").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_project_class_directories_are_indexed() {
    let ws_dir = tempdir().unwrap();
    let home = tempdir().unwrap();
    write(ws_dir.path(), "settings.gradle", "include ':app', ':lib'\n");
    write(
        ws_dir.path(),
        "app/build.gradle",
        "dependencies { implementation project(':lib') }\n",
    );
    write(
        ws_dir.path(),
        "app/src/main/groovy/app/Machine.groovy",
        "package app\nimport com.acme.Gear\nclass Machine {\n  Gear gear\n}\n",
    );
    let classes = ws_dir.path().join("lib/build/classes/groovy/main");
    fs::create_dir_all(classes.join("com/acme")).unwrap();
    fs::write(classes.join("com/acme/Gear.class"), empty_class("com/acme/Gear")).unwrap();

    let ws = open(ws_dir.path(), home.path());
    ws.initialize().await.unwrap();

    let dependencies = ws.index().dependencies().unwrap();
    assert_eq!(dependencies.len(), 1);
    assert!(dependencies[0].ends_with("lib/build/classes"));
    let gear = ws.search_symbols("com.acme.Gear").await.unwrap();
    assert_eq!(gear.len(), 1);
    assert_eq!(gear[0].origin, SymbolOrigin::Archive);
    assert_eq!(gear[0].location.path, dependencies[0]);
}

#[tokio::test]
async fn test_unreadable_file_fails_alone_during_initialize() {
    let ws_dir = tempdir().unwrap();
    let home = tempdir().unwrap();
    write(ws_dir.path(), "Good.groovy", "class Good {}\n");
    fs::write(ws_dir.path().join("Bad.groovy"), [0xff, 0xfe, 0x00, 0xc3]).unwrap();

    let ws = open(ws_dir.path(), home.path());
    let mut events = ws.events().subscribe_file_indexed();
    let indexed = ws.initialize().await.unwrap();
    assert_eq!(indexed.file_count, 2);
    assert_eq!(ws.state(), WorkspaceState::Ready);

    let mut seen: Vec<FileIndexedEvent> = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    let named = |name: &str| {
        seen.iter()
            .filter(|e| e.path.file_name().is_some_and(|n| n == name))
            .collect::<Vec<_>>()
    };
    let bad = named("Bad.groovy");
    assert!(!bad.is_empty());
    assert!(bad.iter().all(|e| !e.is_success()));
    assert!(named("Good.groovy").iter().any(|e| e.is_success()));

    assert_eq!(ws.search_symbols("Good").await.unwrap().len(), 1);
    let files = ws.index().indexed_files().unwrap();
    assert!(files.iter().all(|f| !f.ends_with("Bad.groovy")));
}

#[tokio::test]
async fn test_dropping_a_workspace_keeps_shared_bus_handlers() {
    let ws_dir = tempdir().unwrap();
    let home = tempdir().unwrap();
    write(ws_dir.path(), "A.groovy", "class A {}\n");
    let bus = EventBus::new(64);
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    bus.on_workspace_indexed(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let ws = WorkspaceBuilder::new(ws_dir.path())
        .with_config(config(home.path()))
        .with_event_bus(bus.clone())
        .build()
        .unwrap();
    let indexed = ws.initialize().await.unwrap();
    ws.close().await.unwrap();
    drop(ws);

    bus.publish_workspace_indexed(indexed);
    tokio::time::timeout(Duration::from_secs(5), async {
        while seen.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    bus.close();
}

#[tokio::test]
async fn test_kotlin_build_scripts_are_not_parsed_as_groovy() {
    let ws_dir = tempdir().unwrap();
    let home = tempdir().unwrap();
    let kotlin = "rootProject.name = \"demo\"\nval answer: Int = 42\ninclude(\"app\")\n";
    write(ws_dir.path(), "settings.gradle.kts", kotlin);
    let ws = open(ws_dir.path(), home.path());
    ws.initialize().await.unwrap();

    let path = ws.root().join("settings.gradle.kts");
    let update = ws.update_file(&path).await.unwrap();
    assert!(update.diagnostics.is_empty(), "{:?}", update.diagnostics);
    assert!(update.symbols.is_empty());
    assert!(ws.index().indexed_files().unwrap().iter().any(|f| f.ends_with("settings.gradle.kts")));

    let edited = ws
        .update_file_text(&path, format!("{kotlin}fun broken(: Unit {{\n"), 1)
        .await
        .unwrap();
    assert!(edited.diagnostics.is_empty());
}

#[tokio::test]
async fn test_close_drains_and_rejects_later_work() {
    let (dir, home) = foo_bar_workspace();
    let ws = Arc::new(open(dir.path(), home.path()));
    ws.initialize().await.unwrap();
    let b = ws.root().join("B.groovy");

    let pending = {
        let ws = Arc::clone(&ws);
        let b = b.clone();
        tokio::spawn(async move { ws.update_file_text(&b, "class Bar2 {}".into(), 1).await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    ws.close().await.unwrap();
    ws.close().await.unwrap();

    // Either it finished before close or it was refused; never a half write.
    match pending.await.unwrap() {
        Ok(update) => assert_eq!(update.path, b),
        Err(e) => assert!(matches!(e, GroovyscopeError::Closed)),
    }
    assert_eq!(ws.state(), WorkspaceState::Closed);
    assert!(matches!(
        ws.search_symbols("Bar").await,
        Err(GroovyscopeError::Closed)
    ));
}
