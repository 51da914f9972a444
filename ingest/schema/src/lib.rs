#![deny(warnings)]

pub static DDL_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS locations (
       id        INTEGER NOT NULL PRIMARY KEY,
       city      TEXT NOT NULL,
       country   TEXT NOT NULL,
       timezone  TEXT NOT NULL,

       UNIQUE (city, country)
     )",
    "CREATE TABLE IF NOT EXISTS coordinates (
       id          INTEGER NOT NULL PRIMARY KEY,
       latitude    REAL NOT NULL,
       longitude   REAL NOT NULL,
       location_id INTEGER NOT NULL,

       UNIQUE (latitude, longitude),
       FOREIGN KEY (location_id) REFERENCES locations(id)
     )",
    "CREATE TABLE IF NOT EXISTS images (
       id            INTEGER NOT NULL PRIMARY KEY,
       url_large     TEXT NOT NULL,
       url_medium    TEXT NOT NULL,
       url_small     TEXT NOT NULL,
       sha256        TEXT NOT NULL UNIQUE,
       timestamp     TEXT NOT NULL,
       coordinate_id INTEGER NOT NULL,

       FOREIGN KEY (coordinate_id) REFERENCES coordinates(id)
     )",
    "CREATE TABLE IF NOT EXISTS platforms (
       id        INTEGER NOT NULL PRIMARY KEY,
       name      TEXT NOT NULL UNIQUE
     )",
    "CREATE TABLE IF NOT EXISTS posts (
       id          INTEGER NOT NULL PRIMARY KEY,
       image_id    INTEGER NOT NULL,
       platform_id INTEGER NOT NULL,
       created_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,

       FOREIGN KEY (image_id) REFERENCES images(id) ON DELETE CASCADE,
       FOREIGN KEY (platform_id) REFERENCES platforms(id)
     )",
    "INSERT OR IGNORE INTO platforms (name) VALUES ('Mastodon'), ('X')",
];
