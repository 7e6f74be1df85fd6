mod archive_test;
mod merge_test;
