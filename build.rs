// Copyright (c) 2026, DoNet Edge Contributors.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3.
// You should have received a copy of this license along
// with this source code in a file named "LICENSE."
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

use git_sha1::GitSHA1;

fn main() -> std::io::Result<()> {
    GitSHA1::read()
        .use_default("N/A (Compiled outside of Git)")
        .set("GIT_SHA1");
    Ok(())
}
