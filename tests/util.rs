//! Shared test utilities for integration tests
//!
//! Small Python project fixtures and source generators used across
//! multiple test files.

#![allow(dead_code)]

use assert_fs::prelude::*;

/// Four-file package: a script importing a package module, which imports
/// a sibling relatively.
pub fn make_python_project() -> assert_fs::TempDir
{
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    tmp.child("app/__init__.py")
        .write_str("")
        .expect("write init");

    tmp.child("app/models.py")
        .write_str(
            "class User:\n    \"\"\"A registered user.\"\"\"\n\n    def __init__(self, name):\n        self.name = name\n",
        )
        .expect("write models");

    tmp.child("app/auth.py")
        .write_str(
            "import os\nfrom .models import User\n\n\ndef login(name):\n    \"\"\"Log a user in.\"\"\"\n    return User(name)\n",
        )
        .expect("write auth");

    tmp.child("main.py")
        .write_str(
            "from app.auth import login\n\n\ndef run():\n    return login(\"ada\")\n\n\nif __name__ == \"__main__\":\n    run()\n",
        )
        .expect("write main");

    tmp
}

/// A module with `filler` one-line functions followed by `compute_total`.
///
/// Line count is `filler * 3 + 2`: each filler function takes two lines
/// plus a blank separator, and the target takes the final two.
pub fn long_module(filler: usize) -> String
{
    let mut body = String::new();
    for i in 0..filler
    {
        body.push_str(&format!("def helper_{i}():\n    return {i}\n\n"));
    }
    body.push_str("def compute_total(items):\n    return sum(items)\n");
    body
}

/// `n` lines of trivially valid Python.
pub fn flat_module(n: usize) -> String
{
    (0..n)
        .map(|i| format!("value_{i} = {i}\n"))
        .collect()
}
