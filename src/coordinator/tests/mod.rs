mod teardown;
