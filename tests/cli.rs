use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn document(dir: &TempDir) -> PathBuf {
    write(dir.path(), "doc.tex", r"\p[class=lead]{Tea & cakes}\br{}")
}

#[test]
fn tex_output_reproduces_document() {
    let dir = tempfile::tempdir().unwrap();
    let doc = document(&dir);
    let mut cmd = cargo_bin_cmd!("texpipe");
    cmd.arg("--file").arg(&doc).arg("--pass").arg("TeXOutputPass");

    cmd.assert()
        .success()
        .stdout(r"\p[class=lead]{Tea & cakes}\br{}")
        .stderr(predicate::str::contains("Running pass"));
}

#[test]
fn html_and_xml_output() {
    let dir = tempfile::tempdir().unwrap();
    let doc = document(&dir);

    let mut html = cargo_bin_cmd!("texpipe");
    html.arg("--file").arg(&doc).arg("--pass").arg("HTMLOutputPass");
    html.assert()
        .success()
        .stdout(r#"<p class="lead">Tea &amp; cakes</p><br>"#);

    let mut xml = cargo_bin_cmd!("texpipe");
    xml.arg("--file").arg(&doc).arg("--pass").arg("XMLOutputPass");
    xml.assert()
        .success()
        .stdout(r#"<p class="lead">Tea &amp; cakes</p><br/>"#);
}

#[test]
fn unknown_pass_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let doc = document(&dir);
    let mut cmd = cargo_bin_cmd!("texpipe");
    cmd.arg("--file")
        .arg(&doc)
        .arg("--pass")
        .arg("NoSuchPass")
        .arg("--pass")
        .arg("XMLOutputPass");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("<br/>"))
        .stderr(predicate::str::contains("Unknown pass"));
}

#[test]
fn script_directory_and_config() {
    let dir = tempfile::tempdir().unwrap();
    let doc = document(&dir);
    let scripts = dir.path().join("passes");
    std::fs::create_dir(&scripts).unwrap();
    write(
        &scripts,
        "greet.lua",
        r#"
        function process(tree)
          print("greeting", config.name)
          local p = TextTree.new("p")
          p:append_text("Hello, " .. config.name)
          return p
        end
        "#,
    );

    let mut cmd = cargo_bin_cmd!("texpipe");
    cmd.arg("--file")
        .arg(&doc)
        .arg("--lua-directory")
        .arg(&scripts)
        .arg("--config")
        .arg("name=Ada")
        .arg("--pass")
        .arg("greet")
        .arg("--pass")
        .arg("TeXOutputPass");

    cmd.assert()
        .success()
        .stdout(r"\p{Hello, Ada}")
        .stderr(predicate::str::contains("greeting\tAda"));
}

#[test]
fn config_file_is_layered_under_options() {
    let dir = tempfile::tempdir().unwrap();
    let doc = document(&dir);
    let scripts = dir.path().join("passes");
    std::fs::create_dir(&scripts).unwrap();
    write(
        &scripts,
        "show.lua",
        r#"
        function process(tree)
          local p = TextTree.new("p")
          p:append_text(config["site.title"] .. "/" .. tostring(config.draft))
          return p
        end
        "#,
    );
    let settings = write(dir.path(), "site.toml", "draft = true\n[site]\ntitle = \"Blog\"\n");

    let mut cmd = cargo_bin_cmd!("texpipe");
    cmd.arg("--file")
        .arg(&doc)
        .arg("--lua-directory")
        .arg(&scripts)
        .arg("--config-file")
        .arg(&settings)
        .arg("--config")
        .arg("draft=false")
        .arg("--pass")
        .arg("show")
        .arg("--pass")
        .arg("TeXOutputPass");

    cmd.assert().success().stdout(r"\p{Blog/false}");
}

#[test]
fn list_passes_includes_scripts() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "tidy.lua", "function process(t) return t end");

    let mut cmd = cargo_bin_cmd!("texpipe");
    cmd.arg("--list-passes").arg("--lua-directory").arg(dir.path());

    cmd.assert()
        .success()
        .stdout("HTMLOutputPass\nTeXOutputPass\nXMLOutputPass\ntidy\n");
}

#[test]
fn print_after_all_dumps_tree() {
    let dir = tempfile::tempdir().unwrap();
    let doc = document(&dir);
    let mut cmd = cargo_bin_cmd!("texpipe");
    cmd.arg("--file")
        .arg(&doc)
        .arg("--pass")
        .arg("XMLOutputPass")
        .arg("--print-after-all");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains(r"\p[class=lead]{Tea & cakes}\br{}"));
}

#[test]
fn missing_file_is_a_usage_error() {
    let mut cmd = cargo_bin_cmd!("texpipe");
    cmd.arg("--file").arg("/no/such/document.tex");
    cmd.assert().code(2);
}

#[test]
fn empty_config_key_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let doc = document(&dir);
    let mut cmd = cargo_bin_cmd!("texpipe");
    cmd.arg("--file").arg(&doc).arg("--config").arg("=1");
    cmd.assert().code(2);
}

#[test]
fn unparseable_document_fails() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write(dir.path(), "bad.tex", "stray }");
    let mut cmd = cargo_bin_cmd!("texpipe");
    cmd.arg("--file").arg(&doc).arg("--pass").arg("TeXOutputPass");

    cmd.assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains("Terminating unopened command"));
}

#[test]
fn fatal_script_error_fails() {
    let dir = tempfile::tempdir().unwrap();
    let doc = document(&dir);
    write(
        dir.path(),
        "halt.lua",
        "function process(tree) tree:fatal_error('halting here') end",
    );
    let mut cmd = cargo_bin_cmd!("texpipe");
    cmd.arg("--file")
        .arg(&doc)
        .arg("--lua-directory")
        .arg(dir.path())
        .arg("--pass")
        .arg("halt")
        .arg("--pass")
        .arg("TeXOutputPass");

    cmd.assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains("halting here"));
}

#[test]
fn broken_plugin_fails() {
    let dir = tempfile::tempdir().unwrap();
    let doc = document(&dir);
    let plugin = write(dir.path(), "libfake.so", "not a library");
    let mut cmd = cargo_bin_cmd!("texpipe");
    cmd.arg("--file").arg(&doc).arg("--plugin").arg(&plugin);
    cmd.assert().code(1);
}

#[test]
fn warnings_are_summarised() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write(dir.path(), "doc.tex", r"\todo{later}");
    write(
        dir.path(),
        "lint.lua",
        r#"
        function process(tree)
          tree:match("todo", function(node)
            node:warning("leftover todo")
            return node
          end)
        end
        "#,
    );
    let mut cmd = cargo_bin_cmd!("texpipe");
    cmd.arg("--file")
        .arg(&doc)
        .arg("--lua-directory")
        .arg(dir.path())
        .arg("--pass")
        .arg("lint");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("leftover todo"))
        .stderr(predicate::str::contains("finished with diagnostics"));
}

#[test]
fn script_errors_name_the_pass() {
    let dir = tempfile::tempdir().unwrap();
    let doc = document(&dir);
    write(
        dir.path(),
        "oops.lua",
        "function process(tree) return tree:no_such_method() end",
    );
    let mut cmd = cargo_bin_cmd!("texpipe");
    cmd.arg("--file")
        .arg(&doc)
        .arg("--lua-directory")
        .arg(dir.path())
        .arg("--pass")
        .arg("oops");

    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("Error: pass oops failed"));
}
