// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::sync::Arc;
use std::thread;

use googletest::prelude::*;
use ringstats::key::Key;
use ringstats::key::Tags;
use ringstats::registry::Registry;

const T0: i64 = 1_700_000_000;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_concurrent_get_or_create() {
    init_logger();
    let registry = Arc::new(Registry::builder().buffer_size(60).build().unwrap());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for _ in 0..500 {
                    registry
                        .get_or_create("hits", [("shard", (i % 2).to_string())])
                        .add_at(T0, 1);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_that!(registry.len(), eq(2));
    for shard in ["0", "1"] {
        let meter = registry.get(&Key::new("hits", [("shard", shard)])).unwrap();
        assert_that!(meter.get(T0), eq(2_000));
    }
}

#[test]
fn test_pull_and_merge() {
    init_logger();
    let remote = Registry::builder().buffer_size(3).build().unwrap();
    remote.get_or_create("req", [("code", "200")]).add_at(T0, 4);
    remote.get_or_create("req", [("code", "500")]).add_at(T0 + 2, 1);

    // a snapshot travels as JSON and is merged under the tags of its origin
    let pulled = Registry::from_json(&remote.to_json()).unwrap();
    let local = Registry::builder().buffer_size(3).build().unwrap();
    let origin = Tags::from([("host".to_string(), "web-1".to_string())]);
    local.merge_with_tags(&pulled, &origin).unwrap();
    local.merge_with_tags(&pulled, &origin).unwrap();

    insta::assert_snapshot!(
        local.to_json(),
        @r#"{"meters":{"req code=200&host=web-1":[1700000000,8,0,0],"req code=500&host=web-1":[1700000002,2,0,0]}}"#
    );
}

#[test]
fn test_keys_decode_back_to_tags() {
    let registry = Registry::new();
    registry.get_or_create("lat", [("path", "/a b"), ("dc", "eu")]);
    let keys = registry.keys();
    assert_eq!(keys.len(), 1);
    let (name, tags) = keys[0].decode().unwrap();
    assert_eq!(name, "lat");
    assert_eq!(tags.get("path").map(String::as_str), Some("/a b"));
    assert_eq!(tags.get("dc").map(String::as_str), Some("eu"));
    assert_eq!(registry.buffer_size(), 600);
}

#[test]
fn test_snapshot_at_the_end_of_time() {
    let json = r#"{"meters":{"m":[9223372036854775807,1,2]}}"#;
    let pulled = Registry::from_json(json).unwrap();
    assert_eq!(pulled.to_json(), json);
    assert_eq!(pulled.get(&Key::from("m")).unwrap().get(i64::MAX), 1);

    let local = Registry::builder().buffer_size(2).build().unwrap();
    local.merge(&pulled);
    insta::assert_snapshot!(
        local.to_json(),
        @r#"{"meters":{"m":[9223372036854775807,1,0]}}"#
    );
}
