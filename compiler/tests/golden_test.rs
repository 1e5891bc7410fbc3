//! Runs the generated Go, Java, ECMAScript and C code against fixed serials.
//! Each check is skipped when its toolchain is not installed.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use colf_compiler::{compile_files, emit, Config, Language};

const SCHEMA: &str = "package gold

type Point struct {
	x int32
	y int32
}

type Node struct {
	label text
	next  *Node
}
";

/// Hex of Point{0, 5}, Point{-1, 0} and Node{"a", &Node{}}, then whether a
/// chain of 201 nodes fails with a decode error.
const EXPECTED: &str = "050a\n0301\n0201610500\ntrue\n";

fn installed(tool: &str, version_flag: &str) -> bool {
    let found = Command::new(tool).arg(version_flag).output().map_or(false, |out| out.status.success());
    if !found {
        eprintln!("skipping: {} not found", tool);
    }
    found
}

fn generate(root: &Path, language: Language) -> Vec<PathBuf> {
    let schema = root.join("gold.colf");
    fs::write(&schema, SCHEMA).unwrap();
    let config = Config::new(root);
    let packages = compile_files(&[schema], &config).unwrap();
    emit(&packages, &config, &[language]).unwrap()
}

fn run(command: &mut Command) -> String {
    let out = command.output().unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    String::from_utf8(out.stdout).unwrap()
}

#[test]
fn test_go_golden() {
    if !installed("go", "version") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    generate(dir.path(), Language::Go);
    fs::write(dir.path().join("go.mod"), "module golden\n\ngo 1.19\n").unwrap();
    fs::write(
        dir.path().join("main.go"),
        r#"package main

import (
	"bytes"
	"encoding/hex"
	"errors"
	"fmt"

	"golden/gold"
)

func main() {
	for _, p := range []gold.Point{{X: 0, Y: 5}, {X: -1}} {
		b, err := p.MarshalBinary()
		if err != nil {
			panic(err)
		}
		fmt.Println(hex.EncodeToString(b))
	}
	n := gold.Node{Label: "a", Next: &gold.Node{}}
	b, err := n.MarshalBinary()
	if err != nil {
		panic(err)
	}
	fmt.Println(hex.EncodeToString(b))
	chain := append(bytes.Repeat([]byte{0x05}, 200), 0)
	var d *gold.DecodeError
	fmt.Println(errors.As(new(gold.Node).UnmarshalBinary(chain), &d))
}
"#,
    )
    .unwrap();
    assert_eq!(run(Command::new("go").args(["run", "."]).current_dir(dir.path())), EXPECTED);
}

#[test]
fn test_java_golden() {
    if !installed("javac", "-version") || !installed("java", "-version") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mut sources = generate(dir.path(), Language::Java);
    let main = dir.path().join("Main.java");
    fs::write(
        &main,
        r#"import gold.Node;
import gold.Point;

public class Main {
	static String hex(byte[] b) {
		StringBuilder s = new StringBuilder();
		for (byte c : b) s.append(String.format("%02x", c));
		return s.toString();
	}

	public static void main(String[] args) {
		Point p = new Point();
		p.y = 5;
		System.out.println(hex(p.marshal()));
		p = new Point();
		p.x = -1;
		System.out.println(hex(p.marshal()));
		Node n = new Node();
		n.label = "a";
		n.next = new Node();
		System.out.println(hex(n.marshal()));
		byte[] chain = new byte[201];
		java.util.Arrays.fill(chain, 0, 200, (byte) 5);
		try {
			new Node().unmarshal(chain);
			System.out.println(false);
		} catch (java.util.InputMismatchException e) {
			System.out.println(true);
		}
	}
}
"#,
    )
    .unwrap();
    sources.push(main);
    let classes = dir.path().join("classes");
    run(Command::new("javac").arg("-d").arg(&classes).args(&sources));
    assert_eq!(run(Command::new("java").arg("-cp").arg(&classes).arg("Main")), EXPECTED);
}

#[test]
fn test_ecma_golden() {
    if !installed("node", "--version") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    generate(dir.path(), Language::ECMAScript);
    fs::write(dir.path().join("package.json"), "{\"type\": \"module\"}\n").unwrap();
    fs::write(
        dir.path().join("main.js"),
        r#"import { DecodeError, Node, Point } from './gold/colf.js';

const hex = (b) => Buffer.from(b).toString('hex');
console.log(hex(new Point({ x: 0, y: 5 }).marshal()));
console.log(hex(new Point({ x: -1 }).marshal()));
console.log(hex(new Node({ label: 'a', next: new Node() }).marshal()));
const chain = new Uint8Array(201).fill(5, 0, 200);
try {
	Node.decode(chain);
	console.log(false);
} catch (e) {
	console.log(e instanceof DecodeError);
}
"#,
    )
    .unwrap();
    assert_eq!(run(Command::new("node").arg("main.js").current_dir(dir.path())), EXPECTED);
}

#[test]
fn test_c_golden() {
    if !installed("cc", "--version") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    generate(dir.path(), Language::C);
    fs::write(
        dir.path().join("main.c"),
        r#"#include <stdio.h>
#include <stdlib.h>
#include <string.h>

#include "colf.h"

static void print_hex(colf_status status, uint8_t* data, size_t len) {
	if (status != COLF_OK) {
		printf("%s\n", colf_status_text(status));
		return;
	}
	for (size_t k = 0; k < len; k++) printf("%02x", data[k]);
	printf("\n");
	free(data);
}

int main(void) {
	uint8_t* data = NULL;
	size_t len = 0;
	colf_status status;
	gold_point p = {0, 5};
	status = gold_point_marshal(&p, &data, &len);
	print_hex(status, data, len);
	p.x = -1;
	p.y = 0;
	status = gold_point_marshal(&p, &data, &len);
	print_hex(status, data, len);
	gold_node next = {{NULL, 0}, NULL};
	gold_node n = {{"a", 1}, &next};
	status = gold_node_marshal(&n, &data, &len);
	print_hex(status, data, len);

	uint8_t chain[201];
	memset(chain, 5, 200);
	chain[200] = 0;
	gold_node back;
	printf("%s\n", gold_node_unmarshal(&back, chain, sizeof chain, NULL) == COLF_DEPTH_EXCEEDED ? "true" : "false");
	return 0;
}
"#,
    )
    .unwrap();
    run(Command::new("cc")
        .args(["-std=c99", "-o", "main", "main.c", "colf.c"])
        .current_dir(dir.path()));
    assert_eq!(run(&mut Command::new(dir.path().join("main"))), EXPECTED);
}
