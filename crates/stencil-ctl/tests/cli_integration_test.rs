//! Integration tests for the `stencil-ctl` binary.
//!
//! Each test lays out templates, property files and batch files in a temp
//! directory and runs the compiled binary from there.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn stencil_ctl_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_stencil-ctl"))
}

/// Run stencil-ctl in `work_dir` with HOME pointed at it, so no user config leaks in.
fn run_stencil_ctl(work_dir: &Path, args: &[&str]) -> Output {
    Command::new(stencil_ctl_bin())
        .args(args)
        .current_dir(work_dir)
        .env("HOME", work_dir)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute stencil-ctl")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

const GREETING: &str = "<%@ Property Name=\"Name\" Type=\"string\" Default=\"nobody\" %>\n\
                        <%@ Property Name=\"Greeting\" Type=\"string\" Default=\"Hello\" %>\n\
                        <%= Greeting %>, <%= Name %>!\n";

#[test]
fn test_generate_to_stdout_with_property_flags() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("greet.cst"), GREETING).unwrap();

    let output = run_stencil_ctl(
        dir.path(),
        &["generate", "--template", "greet.cst", "--property", "Name=World"],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "Hello, World!\n");
}

#[test]
fn test_property_flags_override_properties_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("greet.cst"), GREETING).unwrap();
    fs::write(
        dir.path().join("props.xml"),
        r#"<codeGenerator><propertySet>
             <property name="Name">File</property>
             <property name="Greeting">Hi</property>
           </propertySet></codeGenerator>"#,
    )
    .unwrap();

    let output = run_stencil_ctl(
        dir.path(),
        &[
            "generate",
            "-t",
            "greet.cst",
            "-p",
            "props.xml",
            "--property",
            "Name=Flag",
        ],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "Hi, Flag!\n");
}

#[test]
fn test_generate_writes_out_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("greet.cst"), GREETING).unwrap();

    let output = run_stencil_ctl(
        dir.path(),
        &["generate", "--template", "greet.cst", "--out", "gen/hello.txt"],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "");
    assert_eq!(
        fs::read_to_string(dir.path().join("gen/hello.txt")).unwrap(),
        "Hello, nobody!\n"
    );
}

#[test]
fn test_compile_failure_reports_diagnostics_and_fails() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("broken.cst"), "ok\n<% if then %>\n").unwrap();

    let output = run_stencil_ctl(dir.path(), &["generate", "--template", "broken.cst"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("error syntax"), "stderr: {err}");
    assert!(err.contains("Build Failed: 1 Errors, 0 Warnings"), "stderr: {err}");
    assert!(err.contains("__generate"), "stderr: {err}");
    assert_eq!(stdout(&output), "");
}

#[test]
fn test_debug_prints_listing_on_success() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("greet.cst"), GREETING).unwrap();

    let output = run_stencil_ctl(dir.path(), &["generate", "-t", "greet.cst", "--debug"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("Generator1.lua"));
    assert_eq!(stdout(&output), "Hello, nobody!\n");
}

#[test]
fn test_missing_template_fails() {
    let dir = TempDir::new().unwrap();
    let output = run_stencil_ctl(dir.path(), &["generate", "--template", "absent.cst"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("absent.cst"));
}

#[test]
fn test_batch_layers_properties_and_reuses_runner() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("greet.cst"), GREETING).unwrap();
    fs::write(
        dir.path().join("shout.cst"),
        "<%@ Property Name=\"Name\" Type=\"string\" %><%= string.upper(Name) %>\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("jobs.xml"),
        r#"<codeGenerator>
             <defaultTemplate path="greet.cst"/>
             <defaultProperties>
               <property name="Greeting">Howdy</property>
             </defaultProperties>
             <propertySets>
               <propertySet>
                 <property name="Name">Ada</property>
               </propertySet>
               <propertySet>
                 <property name="Greeting">Bye</property>
               </propertySet>
               <propertySet template="shout.cst">
                 <property name="Name">grace</property>
               </propertySet>
             </propertySets>
           </codeGenerator>"#,
    )
    .unwrap();

    let output = run_stencil_ctl(dir.path(), &["batch", "--batch", "jobs.xml"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    // The second set reuses the first runner, so Name keeps its value.
    assert_eq!(
        stdout(&output),
        "Howdy, Ada!\nBye, Ada!\nGRACE\n"
    );
}

#[test]
fn test_batch_outputs_resolve_against_batch_dir() {
    let dir = TempDir::new().unwrap();
    let jobs = dir.path().join("jobs");
    fs::create_dir_all(&jobs).unwrap();
    fs::write(jobs.join("greet.cst"), GREETING).unwrap();
    fs::write(
        jobs.join("batch.xml"),
        r#"<codeSmith>
             <defaultTemplate path="greet.cst"/>
             <defaultOutput path="out/all.txt"/>
             <propertySets>
               <propertySet><property name="Name">A</property></propertySet>
               <propertySet><property name="Name">B</property></propertySet>
               <propertySet output="out/c.txt"><property name="Name">C</property></propertySet>
             </propertySets>
           </codeSmith>"#,
    )
    .unwrap();

    let output = run_stencil_ctl(dir.path(), &["batch", "-b", "jobs/batch.xml"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        fs::read_to_string(jobs.join("out/all.txt")).unwrap(),
        "Hello, A!\nHello, B!\n"
    );
    assert_eq!(
        fs::read_to_string(jobs.join("out/c.txt")).unwrap(),
        "Hello, C!\n"
    );
}

#[test]
fn test_batch_without_template_fails() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("jobs.xml"),
        "<codeGenerator><propertySets><propertySet/></propertySets></codeGenerator>",
    )
    .unwrap();
    let output = run_stencil_ctl(dir.path(), &["batch", "--batch", "jobs.xml"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("names no template"));
}

#[test]
fn test_project_config_supplies_library_paths() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("lib")).unwrap();
    fs::write(
        dir.path().join("lib/inflect.lua"),
        "return { plural = function(word) return word .. \"s\" end }",
    )
    .unwrap();
    fs::write(
        dir.path().join(".stencil.toml"),
        "library-paths = [\"lib\"]\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("plural.cst"),
        "<%@ Assembly Name=\"inflect\" %><%= inflect.plural(\"Order\") %>",
    )
    .unwrap();

    let output = run_stencil_ctl(dir.path(), &["generate", "-t", "plural.cst"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "Orders");
}
