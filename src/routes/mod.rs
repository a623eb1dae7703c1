// Route modules for the wagermatch API

pub mod accounts;
